//! Snowgate - Command Cooldowns and Concurrency Limits
//!
//! This crate implements per-command rate limiting for chat bots. Commands
//! are grouped into named buckets, and each bucket is partitioned by a
//! resource scope (user, member, channel, parent channel, top role, guild
//! or global). A [`CooldownManager`] limits how often a bucket can be used
//! within a window; a [`ConcurrencyLimiter`] limits how many uses of a
//! bucket can run at once.
//!
//! ```no_run
//! use snowgate::{BucketResource, ConcurrencyLimiter, CooldownManager};
//! use std::time::Duration;
//!
//! # async fn run() -> snowgate::Result<()> {
//! let cooldowns = CooldownManager::new();
//! cooldowns.configure_bucket("ban", BucketResource::Guild, 5, Duration::from_secs(60))?;
//! cooldowns.open()?;
//!
//! let limiter = ConcurrencyLimiter::new();
//! limiter.configure_bucket("render", BucketResource::Channel, 2)?;
//! limiter.open()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;

pub use config::SnowgateConfig;
pub use error::{Result, SnowgateError};
pub use ratelimit::{BucketResource, ConcurrencyLimiter, Context, CooldownManager};
