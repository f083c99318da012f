//! Cooldown and concurrency limiting keyed by resource scope.

mod backend;
mod bucket;
mod concurrency;
mod context;
mod cooldown;
mod key;
mod limiter;
mod manager;
mod registry;
mod resource;
mod sweeper;

#[cfg(test)]
mod testing;

pub use backend::{ConcurrencyBackend, CooldownBackend};
pub use bucket::{Bucket, Expire, Factory, FlatBucket, GlobalBucket, MemberBucket, Shared};
pub use concurrency::ConcurrencyLimit;
pub use context::{AsyncCache, CacheError, Channel, Context, Member, RequestId, Role, Snowflake};
pub use cooldown::Cooldown;
pub use key::resolve_key;
pub use limiter::ConcurrencyLimiter;
pub use manager::CooldownManager;
pub use registry::DEFAULT_BUCKET;
pub use resource::BucketResource;
pub use sweeper::DEFAULT_SWEEP_INTERVAL;
