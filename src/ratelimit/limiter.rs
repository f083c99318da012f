//! In-memory concurrency limiter.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::backend::ConcurrencyBackend;
use super::bucket::{Bucket, Factory, Shared};
use super::concurrency::ConcurrencyLimit;
use super::context::{Context, RequestId};
use super::registry::BucketRegistry;
use super::resource::BucketResource;
use super::sweeper::Sweeper;
use crate::config::ConcurrencyConfig;
use crate::error::{Result, SnowgateError};

/// Concurrent uses allowed by the built-in default bucket.
const DEFAULT_LIMIT: u32 = 1;

/// Key of an in-flight acquisition.
type LedgerKey = (String, RequestId);

/// Limits how many invocations of a bucket can run at once per resource.
///
/// Unconfigured bucket ids fall back to a copy of the `"default"` bucket,
/// which starts out as one concurrent use per user.
///
/// Acquisitions are recorded against the context's
/// [`RequestId`](super::RequestId) together with the exact state they took a
/// slot from. Releasing goes straight to that state instead of resolving the
/// resource key again, which may need REST calls and could resolve
/// differently if roles or channels changed while the command ran.
pub struct ConcurrencyLimiter {
    registry: Arc<BucketRegistry<ConcurrencyLimit>>,
    /// In-flight acquisitions
    ledger: DashMap<LedgerKey, Shared<ConcurrencyLimit>>,
    sweeper: Sweeper,
}

impl ConcurrencyLimiter {
    /// Create a concurrency limiter with the default sweep interval.
    pub fn new() -> Self {
        Self::build(Sweeper::with_default_interval("concurrency"))
    }

    /// Create a concurrency limiter that sweeps every `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Result<Self> {
        Ok(Self::build(Sweeper::new("concurrency", interval)?))
    }

    fn build(sweeper: Sweeper) -> Self {
        let factory: Factory<ConcurrencyLimit> = Arc::new(|| ConcurrencyLimit::new(DEFAULT_LIMIT));
        Self {
            registry: Arc::new(BucketRegistry::new(
                "concurrency",
                Bucket::new(BucketResource::User, factory),
            )),
            ledger: DashMap::new(),
            sweeper,
        }
    }

    /// Create a concurrency limiter from configuration.
    pub fn from_config(config: &ConcurrencyConfig) -> Result<Self> {
        let limiter = Self::with_sweep_interval(config.sweep_interval())?;
        for (bucket_id, bucket) in &config.buckets {
            limiter.configure_bucket(bucket_id, bucket.resource, bucket.limit)?;
        }
        for bucket_id in &config.disabled {
            limiter.disable_bucket(bucket_id);
        }

        info!(
            buckets = config.buckets.len(),
            disabled = config.disabled.len(),
            "Concurrency limiter configured"
        );
        Ok(limiter)
    }

    /// Try to take a slot on a bucket for `ctx`.
    ///
    /// Acquiring again with the same context before releasing returns `true`
    /// without taking a second slot, including when the calls overlap.
    pub async fn try_acquire(&self, bucket_id: &str, ctx: &dyn Context) -> Result<bool> {
        let bucket = self.registry.get_or_default(bucket_id);
        let request = ctx.request_id();
        let key = (bucket_id.to_string(), request);
        if self.ledger.contains_key(&key) {
            trace!(bucket = %bucket_id, %request, "Request already holds this bucket");
            return Ok(true);
        }

        // Key resolution may yield, so another call for this request can
        // record its slot before this one gets back.
        let state = bucket.get_or_create(ctx).await?;
        if !state.lock().acquire() {
            if self.ledger.contains_key(&key) {
                return Ok(true);
            }
            debug!(bucket = %bucket_id, %request, "Concurrency limit reached");
            return Ok(false);
        }

        let duplicate = match self.ledger.entry(key) {
            Entry::Occupied(_) => true,
            Entry::Vacant(entry) => {
                entry.insert(state.clone());
                false
            }
        };
        if duplicate {
            trace!(bucket = %bucket_id, %request, "Request acquired this bucket concurrently, undoing");
            state.lock().release()?;
        } else {
            trace!(bucket = %bucket_id, %request, "Acquired concurrency slot");
        }

        Ok(true)
    }

    /// Release the slot `ctx` holds on a bucket.
    ///
    /// Releasing something that was never acquired is a no-op.
    ///
    /// # Errors
    /// Returns [`SnowgateError::ReleaseWithoutAcquire`] if the recorded state
    /// has no slot to give back, which means the ledger and the state
    /// disagree.
    pub async fn release(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()> {
        let key = (bucket_id.to_string(), ctx.request_id());
        let Some((_, state)) = self.ledger.remove(&key) else {
            trace!(bucket = %bucket_id, request = %key.1, "Nothing to release");
            return Ok(());
        };

        let result = state.lock().release();
        if let Err(ref e) = result {
            warn!(bucket = %bucket_id, request = %key.1, error = %e, "Concurrency ledger out of sync");
        }
        result
    }

    /// Set the concurrency limit for a bucket.
    ///
    /// `"default"` is the template for unconfigured bucket ids. Changing it
    /// doesn't affect ids that have already been used.
    ///
    /// # Errors
    /// Returns [`SnowgateError::Config`] if `limit` is zero.
    pub fn configure_bucket(&self, bucket_id: &str, resource: BucketResource, limit: u32) -> Result<&Self> {
        if limit == 0 {
            return Err(SnowgateError::Config("limit must be greater than 0".to_string()));
        }

        let factory: Factory<ConcurrencyLimit> = Arc::new(move || ConcurrencyLimit::new(limit));
        self.registry.set(bucket_id, Bucket::new(resource, factory));
        Ok(self)
    }

    /// Stop a bucket from ever hitting a concurrency limit.
    ///
    /// This also stops the bucket from falling back to `"default"`.
    pub fn disable_bucket(&self, bucket_id: &str) -> &Self {
        let factory: Factory<ConcurrencyLimit> = Arc::new(ConcurrencyLimit::unlimited);
        self.registry.set(bucket_id, Bucket::new(BucketResource::Global, factory));
        self
    }

    /// Start sweeping idle limits in the background.
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

    /// Sweep idle limits now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.registry.sweep(Instant::now())
    }

    /// Number of acquisitions that haven't been released yet.
    pub fn in_flight(&self) -> usize {
        self.ledger.len()
    }

    /// Number of bucket ids that have been configured or used.
    pub fn bucket_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of live per-key limits in a bucket, `None` if the bucket
    /// doesn't exist.
    pub fn state_count(&self, bucket_id: &str) -> Option<usize> {
        self.registry.get(bucket_id).map(|bucket| bucket.len())
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConcurrencyBackend for ConcurrencyLimiter {
    async fn try_acquire(&self, bucket_id: &str, ctx: &dyn Context) -> Result<bool> {
        ConcurrencyLimiter::try_acquire(self, bucket_id, ctx).await
    }

    async fn release(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()> {
        ConcurrencyLimiter::release(self, bucket_id, ctx).await
    }
}
