//! Configuration management for snowgate.
//!
//! Bucket definitions can be built in code through the managers'
//! `configure_bucket` / `disable_bucket` calls or loaded from YAML:
//!
//! ```yaml
//! cooldowns:
//!   sweep_interval_secs: 10
//!   buckets:
//!     default: { resource: user, limit: 10, reset_after_secs: 60 }
//!     moderation: { resource: guild, limit: 100, reset_after_secs: 300 }
//!   disabled: [ping]
//! concurrency:
//!   buckets:
//!     default: { resource: user, limit: 1 }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, SnowgateError};
use crate::ratelimit::BucketResource;

/// Main configuration for snowgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnowgateConfig {
    /// Cooldown manager configuration
    #[serde(default)]
    pub cooldowns: CooldownConfig,

    /// Concurrency limiter configuration
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

/// Cooldown manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Seconds between sweeps of expired cooldowns
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Bucket definitions by id
    #[serde(default)]
    pub buckets: BTreeMap<String, CooldownBucketConfig>,

    /// Bucket ids that never hit a cooldown
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            buckets: BTreeMap::new(),
            disabled: Vec::new(),
        }
    }
}

/// A single cooldown bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownBucketConfig {
    /// What the bucket is partitioned by
    pub resource: BucketResource,
    /// Uses allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub reset_after_secs: f64,
}

impl CooldownBucketConfig {
    /// Window length as a duration.
    pub fn reset_after(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.reset_after_secs).map_err(|e| {
            SnowgateError::Config(format!("Invalid reset_after_secs {}: {}", self.reset_after_secs, e))
        })
    }
}

/// Concurrency limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Seconds between sweeps of idle limits
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Bucket definitions by id
    #[serde(default)]
    pub buckets: BTreeMap<String, ConcurrencyBucketConfig>,

    /// Bucket ids that never hit a concurrency limit
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            buckets: BTreeMap::new(),
            disabled: Vec::new(),
        }
    }
}

/// A single concurrency bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyBucketConfig {
    /// What the bucket is partitioned by
    pub resource: BucketResource,
    /// Concurrent uses allowed
    pub limit: u32,
}

fn default_sweep_interval() -> u64 {
    10
}

impl CooldownConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl ConcurrencyConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl SnowgateConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SnowgateError::Config(format!("Failed to parse limiter config: {}", e)))
    }
}
