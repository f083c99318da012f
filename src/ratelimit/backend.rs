//! Limiter traits for abstracting over manager implementations.

use async_trait::async_trait;
use std::time::Duration;

use super::context::Context;
use crate::error::Result;

/// Trait for cooldown manager implementations.
///
/// The command hook layer holds an `Arc<dyn CooldownBackend>` so it works the
/// same against [`CooldownManager`](super::CooldownManager) or any other
/// implementation.
#[async_trait]
pub trait CooldownBackend: Send + Sync {
    /// Check if a bucket is on cooldown for `ctx`, optionally recording a use
    /// if it isn't. Returns how long until the bucket can next be used.
    async fn check_cooldown(
        &self,
        bucket_id: &str,
        ctx: &dyn Context,
        increment: bool,
    ) -> Result<Option<Duration>>;

    /// Record a use of a bucket for `ctx`.
    async fn increment_cooldown(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()>;
}

/// Trait for concurrency limiter implementations.
///
/// Every successful [`try_acquire`](ConcurrencyBackend::try_acquire) must be
/// paired with a [`release`](ConcurrencyBackend::release) for the same
/// context once the guarded operation finishes, whether it failed or not.
#[async_trait]
pub trait ConcurrencyBackend: Send + Sync {
    /// Try to take a concurrency slot on a bucket for `ctx`.
    async fn try_acquire(&self, bucket_id: &str, ctx: &dyn Context) -> Result<bool>;

    /// Release the slot `ctx` holds on a bucket.
    async fn release(&self, bucket_id: &str, ctx: &dyn Context) -> Result<()>;
}
