//! Error types for snowgate.

use thiserror::Error;

/// Boxed error returned by context collaborators (REST fetches and the like).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for snowgate operations.
#[derive(Error, Debug)]
pub enum SnowgateError {
    /// Invalid bucket configuration (zero limits, unknown resources, bad YAML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A manager was opened twice, closed while idle or opened outside a runtime
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// A finite concurrency limit was released more times than it was acquired
    #[error("Cannot release a concurrency limit that has not been acquired")]
    ReleaseWithoutAcquire,

    /// The context didn't carry enough information to derive a bucket key
    #[error("Failed to resolve resource key: {reason}")]
    Unresolvable {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnowgateError {
    /// Whether this error came from invalid configuration input.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether this error is an open/close contract violation.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}

/// Result type alias for snowgate operations.
pub type Result<T> = std::result::Result<T, SnowgateError>;
