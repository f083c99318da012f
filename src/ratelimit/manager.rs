//! In-memory cooldown manager.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::backend::CooldownBackend;
use super::bucket::{Bucket, Factory};
use super::context::Context;
use super::cooldown::Cooldown;
use super::registry::BucketRegistry;
use super::resource::BucketResource;
use super::sweeper::Sweeper;
use crate::config::CooldownConfig;
use crate::error::{Result, SnowgateError};

/// Uses allowed per window by the built-in default bucket.
const DEFAULT_LIMIT: u32 = 2;
/// Window of the built-in default bucket.
const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(5);

/// Tracks command cooldowns per bucket and resource.
///
/// Unconfigured bucket ids fall back to a copy of the `"default"` bucket,
/// which starts out as per-user, 2 uses per 5 seconds.
///
/// ```no_run
/// use snowgate::{BucketResource, CooldownManager};
/// use std::time::Duration;
///
/// # fn main() -> snowgate::Result<()> {
/// let cooldowns = CooldownManager::new();
/// cooldowns
///     // 10 uses per minute per user for anything not configured
///     .configure_bucket("default", BucketResource::User, 10, Duration::from_secs(60))?
///     // 100 uses per 5 minutes per guild
///     .configure_bucket("moderation", BucketResource::Guild, 100, Duration::from_secs(300))?
///     .disable_bucket("ping");
/// # Ok(())
/// # }
/// ```
pub struct CooldownManager {
    registry: Arc<BucketRegistry<Cooldown>>,
    sweeper: Sweeper,
}

impl CooldownManager {
    /// Create a cooldown manager with the default sweep interval.
    pub fn new() -> Self {
        Self::build(Sweeper::with_default_interval("cooldown"))
    }

    /// Create a cooldown manager that sweeps every `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Result<Self> {
        Ok(Self::build(Sweeper::new("cooldown", interval)?))
    }

    fn build(sweeper: Sweeper) -> Self {
        let factory: Factory<Cooldown> = Arc::new(|| Cooldown::new(DEFAULT_LIMIT, DEFAULT_RESET_AFTER));
        Self {
            registry: Arc::new(BucketRegistry::new(
                "cooldown",
                Bucket::new(BucketResource::User, factory),
            )),
            sweeper,
        }
    }

    /// Create a cooldown manager from configuration.
    pub fn from_config(config: &CooldownConfig) -> Result<Self> {
        let manager = Self::with_sweep_interval(config.sweep_interval())?;
        for (bucket_id, bucket) in &config.buckets {
            manager.configure_bucket(bucket_id, bucket.resource, bucket.limit, bucket.reset_after()?)?;
        }
        for bucket_id in &config.disabled {
            manager.disable_bucket(bucket_id);
        }

        info!(
            buckets = config.buckets.len(),
            disabled = config.disabled.len(),
            "Cooldown manager configured"
        );
        Ok(manager)
    }

    /// Check whether a bucket is on cooldown for `ctx`.
    ///
    /// Returns how long until the bucket can next be used, or `None` if it
    /// can be used now. With `increment`, a use is also recorded when the
    /// bucket isn't on cooldown. Without it, nothing is created: a bucket or
    /// key that has never been used simply isn't on cooldown.
    pub async fn check_cooldown(
        &self,
        bucket_id: &str,
        ctx: &dyn Context,
        increment: bool,
    ) -> Result<Option<Duration>> {
        trace!(bucket = %bucket_id, increment, "Checking cooldown");

        if !increment {
            let Some(bucket) = self.registry.get(bucket_id) else {
                return Ok(None);
            };
            let Some(state) = bucket.try_get(ctx).await? else {
                return Ok(None);
            };
            let wait = state.lock().must_wait_for(Instant::now());
            return Ok(wait);
        }

        let state = self.registry.get_or_default(bucket_id).get_or_create(ctx).await?;
        let now = Instant::now();
        let mut cooldown = state.lock();
        if let Some(wait) = cooldown.must_wait_for(now) {
            debug!(bucket = %bucket_id, wait = ?wait, "Bucket on cooldown");
            return Ok(Some(wait));
        }

        cooldown.increment(now);
        Ok(None)
    }

    /// Record a use of a bucket for `ctx`.
    pub async fn increment_cooldown(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()> {
        let state = self.registry.get_or_default(bucket_id).get_or_create(ctx).await?;
        state.lock().increment(Instant::now());
        Ok(())
    }

    /// Set the cooldown for a bucket.
    ///
    /// `"default"` is the template for unconfigured bucket ids. Changing it
    /// doesn't affect ids that have already been used.
    ///
    /// # Errors
    /// Returns [`SnowgateError::Config`] if `limit` or `reset_after` is zero,
    /// or if `reset_after` is longer than [`Cooldown::MAX_WINDOW`].
    pub fn configure_bucket(
        &self,
        bucket_id: &str,
        resource: BucketResource,
        limit: u32,
        reset_after: Duration,
    ) -> Result<&Self> {
        if reset_after.is_zero() {
            return Err(SnowgateError::Config(
                "reset_after must be greater than 0 seconds".to_string(),
            ));
        }
        if reset_after > Cooldown::MAX_WINDOW || Instant::now().checked_add(reset_after).is_none() {
            return Err(SnowgateError::Config(format!(
                "reset_after must be at most {} seconds",
                Cooldown::MAX_WINDOW.as_secs()
            )));
        }
        if limit == 0 {
            return Err(SnowgateError::Config("limit must be greater than 0".to_string()));
        }

        let factory: Factory<Cooldown> = Arc::new(move || Cooldown::new(limit, reset_after));
        self.registry.set(bucket_id, Bucket::new(resource, factory));
        Ok(self)
    }

    /// Stop a bucket from ever hitting a cooldown.
    ///
    /// This also stops the bucket from falling back to `"default"`.
    pub fn disable_bucket(&self, bucket_id: &str) -> &Self {
        let factory: Factory<Cooldown> = Arc::new(Cooldown::unlimited);
        self.registry.set(bucket_id, Bucket::new(BucketResource::Global, factory));
        self
    }

    /// Start sweeping expired cooldowns in the background.
    ///
    /// # Errors
    /// Returns [`SnowgateError::Lifecycle`] if already open or called
    /// outside a Tokio runtime.
    pub fn open(&self) -> Result<()> {
        let registry = self.registry.clone();
        self.sweeper.start(move || registry.sweep(Instant::now()))
    }

    /// Stop the background sweep.
    ///
    /// # Errors
    /// Returns [`SnowgateError::Lifecycle`] if not open.
    pub fn close(&self) -> Result<()> {
        self.sweeper.stop()
    }

    /// Whether the background sweep is running.
    pub fn is_open(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Time between background sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.sweeper.interval()
    }

    /// Sweep expired cooldowns now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.registry.sweep(Instant::now())
    }

    /// Number of bucket ids that have been configured or used.
    pub fn bucket_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of live per-key cooldowns in a bucket, `None` if the bucket
    /// doesn't exist.
    pub fn state_count(&self, bucket_id: &str) -> Option<usize> {
        self.registry.get(bucket_id).map(|bucket| bucket.len())
    }
}

impl Default for CooldownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CooldownBackend for CooldownManager {
    async fn check_cooldown(
        &self,
        bucket_id: &str,
        ctx: &dyn Context,
        increment: bool,
    ) -> Result<Option<Duration>> {
        CooldownManager::check_cooldown(self, bucket_id, ctx, increment).await
    }

    async fn increment_cooldown(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()> {
        CooldownManager::increment_cooldown(self, bucket_id, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::testing::TestContext;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_default_bucket_allows_two_per_five_seconds() {
        let manager = CooldownManager::new();
        let ctx = TestContext::dm(1, 2);

        assert_eq!(manager.check_cooldown("cmd", &ctx, true).await.unwrap(), None);
        assert_eq!(manager.check_cooldown("cmd", &ctx, true).await.unwrap(), None);

        let wait = manager.check_cooldown("cmd", &ctx, true).await.unwrap().unwrap();
        assert_eq!(wait, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_fresh_window() {
        let manager = CooldownManager::new();
        manager
            .configure_bucket("cmd", BucketResource::User, 3, Duration::from_secs(10))
            .unwrap();
        let ctx = TestContext::guild(1, 2, 3);

        for _ in 0..3 {
            assert!(manager.check_cooldown("cmd", &ctx, true).await.unwrap().is_none());
        }

        advance(Duration::from_secs(4)).await;
        let wait = manager.check_cooldown("cmd", &ctx, true).await.unwrap().unwrap();
        assert_eq!(wait, Duration::from_secs(6));

        advance(Duration::from_secs(6)).await;
        assert!(manager.check_cooldown("cmd", &ctx, true).await.unwrap().is_none());
        assert!(manager.check_cooldown("cmd", &ctx, false).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_check_does_not_increment() {
        let manager = CooldownManager::new();
        manager
            .configure_bucket("cmd", BucketResource::User, 1, Duration::from_secs(10))
            .unwrap();
        let ctx = TestContext::dm(1, 2);

        manager.check_cooldown("cmd", &ctx, true).await.unwrap();
        for _ in 0..5 {
            assert!(manager.check_cooldown("cmd", &ctx, true).await.unwrap().is_some());
        }

        advance(Duration::from_secs(10)).await;
        assert!(manager.check_cooldown("cmd", &ctx, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pure_check_creates_nothing() {
        let manager = CooldownManager::new();
        let ctx = TestContext::dm(1, 2);

        assert_eq!(manager.check_cooldown("never-seen", &ctx, false).await.unwrap(), None);
        assert_eq!(manager.bucket_count(), 0);

        manager
            .configure_bucket("cmd", BucketResource::User, 1, Duration::from_secs(10))
            .unwrap();
        assert_eq!(manager.check_cooldown("cmd", &ctx, false).await.unwrap(), None);
        assert_eq!(manager.state_count("cmd"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pure_check_reports_wait() {
        let manager = CooldownManager::new();
        manager
            .configure_bucket("cmd", BucketResource::Channel, 1, Duration::from_secs(30))
            .unwrap();
        let ctx = TestContext::guild(1, 2, 3);
        let same_channel = TestContext::guild(4, 2, 3);

        manager.increment_cooldown("cmd", &ctx).await.unwrap();
        let wait = manager.check_cooldown("cmd", &same_channel, false).await.unwrap();
        assert_eq!(wait, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_invalid_configuration_rejected() {
        let manager = CooldownManager::new();

        let err = manager
            .configure_bucket("cmd", BucketResource::User, 0, Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(err.is_config());

        let err = manager
            .configure_bucket("cmd", BucketResource::User, 1, Duration::ZERO)
            .err()
            .unwrap();
        assert!(err.is_config());
        assert_eq!(manager.bucket_count(), 0);
    }

    #[tokio::test]
    async fn test_overlong_window_rejected() {
        let manager = CooldownManager::new();
        let err = manager
            .configure_bucket("cmd", BucketResource::User, 1, Duration::from_secs(u64::MAX))
            .err()
            .unwrap();
        assert!(err.is_config());
        assert_eq!(manager.bucket_count(), 0);

        // The id falls back to the default bucket and stays usable.
        let ctx = TestContext::dm(1, 2);
        assert_eq!(manager.check_cooldown("cmd", &ctx, true).await.unwrap(), None);

        manager
            .configure_bucket("long", BucketResource::User, 1, Cooldown::MAX_WINDOW)
            .unwrap();
        manager.increment_cooldown("long", &ctx).await.unwrap();
        assert!(manager.check_cooldown("long", &ctx, false).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disabled_bucket_never_waits() {
        let manager = CooldownManager::new();
        manager.disable_bucket("cmd");
        let ctx = TestContext::dm(1, 2);

        for _ in 0..50 {
            assert!(manager.check_cooldown("cmd", &ctx, true).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_disable_default_only_affects_new_ids() {
        let manager = CooldownManager::new();
        manager
            .configure_bucket("default", BucketResource::User, 1, Duration::from_secs(60))
            .unwrap();
        let ctx = TestContext::dm(1, 2);

        manager.check_cooldown("old", &ctx, true).await.unwrap();
        manager.disable_bucket("default");

        assert!(manager.check_cooldown("old", &ctx, true).await.unwrap().is_some());
        for _ in 0..5 {
            assert!(manager.check_cooldown("new", &ctx, true).await.unwrap().is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_elapsed_entries() {
        let manager = CooldownManager::new();
        manager
            .configure_bucket("cmd", BucketResource::User, 5, Duration::from_secs(10))
            .unwrap();
        let early = TestContext::dm(1, 2);
        let late = TestContext::dm(3, 4);

        manager.increment_cooldown("cmd", &early).await.unwrap();
        advance(Duration::from_secs(5)).await;
        manager.increment_cooldown("cmd", &late).await.unwrap();

        assert_eq!(manager.sweep(), 0);
        advance(Duration::from_secs(5)).await;
        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.state_count("cmd"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_sweeps_in_background() {
        let manager = CooldownManager::with_sweep_interval(Duration::from_secs(10)).unwrap();
        let ctx = TestContext::dm(1, 2);
        manager.increment_cooldown("cmd", &ctx).await.unwrap();

        manager.open().unwrap();
        assert!(manager.is_open());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(manager.state_count("cmd"), Some(0));

        manager.close().unwrap();
        assert!(!manager.is_open());
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let manager = CooldownManager::new();
        assert!(manager.close().unwrap_err().is_lifecycle());
        manager.open().unwrap();
        assert!(manager.open().unwrap_err().is_lifecycle());
        manager.close().unwrap();
    }

    #[test]
    fn test_from_config() {
        let config = crate::config::SnowgateConfig::from_yaml(
            r#"
cooldowns:
  sweep_interval_secs: 20
  buckets:
    default: { resource: guild, limit: 4, reset_after_secs: 1.5 }
  disabled: [ping]
"#,
        )
        .unwrap();

        let manager = CooldownManager::from_config(&config.cooldowns).unwrap();
        assert_eq!(manager.sweep_interval(), Duration::from_secs(20));
        assert_eq!(manager.bucket_count(), 2);
    }

    #[test]
    fn test_from_config_rejects_zero_limit() {
        let config = crate::config::SnowgateConfig::from_yaml(
            r#"
cooldowns:
  buckets:
    broken: { resource: user, limit: 0, reset_after_secs: 1 }
"#,
        )
        .unwrap();

        assert!(CooldownManager::from_config(&config.cooldowns).err().unwrap().is_config());
    }

    #[test]
    fn test_from_config_rejects_overlong_window() {
        let config = crate::config::SnowgateConfig::from_yaml(
            r#"
cooldowns:
  buckets:
    forever: { resource: user, limit: 1, reset_after_secs: 1e19 }
"#,
        )
        .unwrap();

        assert!(CooldownManager::from_config(&config.cooldowns).err().unwrap().is_config());
    }
}
