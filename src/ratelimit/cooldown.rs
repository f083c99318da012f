//! Per-key cooldown state.

use std::time::Duration;
use tokio::time::Instant;

use super::bucket::Expire;

/// A use counter over a rolling reset window.
///
/// The window starts on the first use rather than on creation, so a state
/// that was created by a check and never used doesn't start counting down.
/// All methods take the current instant so callers control the clock.
#[derive(Debug, Clone)]
pub struct Cooldown {
    /// Uses in the current window
    counter: u32,
    /// Uses allowed per window, `None` for uncapped
    limit: Option<u32>,
    /// Length of the window
    reset_after: Duration,
    /// When the current window ends
    resets_at: Instant,
}

impl Cooldown {
    /// Longest window a cooldown tracks. Longer windows are capped to this.
    pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

    /// Create a cooldown allowing `limit` uses per `reset_after`.
    pub fn new(limit: u32, reset_after: Duration) -> Self {
        Self::with_limit(Some(limit), reset_after)
    }

    /// Create a cooldown that never blocks.
    pub fn unlimited() -> Self {
        Self::with_limit(None, Duration::ZERO)
    }

    fn with_limit(limit: Option<u32>, reset_after: Duration) -> Self {
        let reset_after = reset_after.min(Self::MAX_WINDOW);
        Self {
            counter: 0,
            limit,
            reset_after,
            resets_at: window_end(Instant::now(), reset_after),
        }
    }

    /// Record a use.
    pub fn increment(&mut self, now: Instant) {
        let Some(limit) = self.limit else {
            return;
        };

        if self.counter == 0 {
            self.resets_at = window_end(now, self.reset_after);
        } else if now >= self.resets_at {
            self.counter = 0;
            self.resets_at = window_end(now, self.reset_after);
        }

        if self.counter < limit {
            self.counter += 1;
        }
    }

    /// How long until the next use is allowed, `None` if it's allowed now.
    pub fn must_wait_for(&self, now: Instant) -> Option<Duration> {
        let limit = self.limit?;
        if self.counter >= limit && self.resets_at > now {
            Some(self.resets_at - now)
        } else {
            None
        }
    }

    /// Uses recorded in the current window.
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Uses allowed per window, `None` for uncapped.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Length of the window.
    pub fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// When the current window ends.
    pub fn resets_at(&self) -> Instant {
        self.resets_at
    }
}

fn window_end(now: Instant, reset_after: Duration) -> Instant {
    now.checked_add(reset_after).unwrap_or(now)
}

impl Expire for Cooldown {
    // Stale-but-unexhausted states also count; they'd restart on next use.
    fn has_expired(&self, now: Instant) -> bool {
        now >= self.resets_at
    }
}
