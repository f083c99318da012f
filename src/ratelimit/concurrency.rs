//! Per-key concurrency state.

use tokio::time::Instant;

use super::bucket::Expire;
use crate::error::{Result, SnowgateError};

/// Counter of in-flight operations with an optional cap.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    counter: u32,
    /// `None` for uncapped; uncapped limits don't count
    limit: Option<u32>,
}

impl ConcurrencyLimit {
    /// Create a limit allowing `limit` concurrent operations.
    pub fn new(limit: u32) -> Self {
        Self {
            counter: 0,
            limit: Some(limit),
        }
    }

    /// Create a limit that always acquires.
    pub fn unlimited() -> Self {
        Self {
            counter: 0,
            limit: None,
        }
    }

    /// Take a slot if one is free.
    pub fn acquire(&mut self) -> bool {
        match self.limit {
            None => true,
            Some(limit) if self.counter < limit => {
                self.counter += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Give a slot back.
    ///
    /// Releasing a finite limit with nothing acquired means the caller's
    /// bookkeeping is out of sync with this state and is reported as
    /// [`SnowgateError::ReleaseWithoutAcquire`].
    pub fn release(&mut self) -> Result<()> {
        if self.counter > 0 {
            self.counter -= 1;
            return Ok(());
        }

        match self.limit {
            None => Ok(()),
            Some(_) => Err(SnowgateError::ReleaseWithoutAcquire),
        }
    }

    /// Operations currently holding a slot.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Maximum concurrent operations, `None` for uncapped.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }
}

impl Expire for ConcurrencyLimit {
    fn has_expired(&self, _now: Instant) -> bool {
        self.counter == 0
    }
}
