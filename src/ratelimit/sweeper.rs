//! Background sweep task tied to a manager's open/close lifecycle.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::error::{Result, SnowgateError};

/// Default time between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Owns the periodic sweep task of one manager.
///
/// The task is aborted by [`Sweeper::stop`] or when the sweeper is dropped.
pub(crate) struct Sweeper {
    kind: &'static str,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    pub(crate) fn new(kind: &'static str, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(SnowgateError::Config(
                "sweep interval must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            kind,
            interval,
            task: Mutex::new(None),
        })
    }

    pub(crate) fn with_default_interval(kind: &'static str) -> Self {
        Self {
            kind,
            interval: DEFAULT_SWEEP_INTERVAL,
            task: Mutex::new(None),
        }
    }

    /// Start calling `sweep` every interval.
    ///
    /// Fails if already running or if there's no Tokio runtime to spawn on.
    pub(crate) fn start<F>(&self, sweep: F) -> Result<()>
    where
        F: Fn() -> usize + Send + 'static,
    {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(SnowgateError::Lifecycle(format!(
                "{} manager is already running",
                self.kind
            )));
        }

        let runtime = Handle::try_current().map_err(|e| {
            SnowgateError::Lifecycle(format!("{} manager must be opened inside a Tokio runtime: {}", self.kind, e))
        })?;

        let kind = self.kind;
        let interval = self.interval;
        *task = Some(runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = sweep();
                if removed > 0 {
                    debug!(kind, removed, "Swept expired bucket states");
                } else {
                    trace!(kind, "Sweep found nothing to remove");
                }
            }
        }));

        info!(kind = self.kind, interval = ?self.interval, "Started bucket sweep");
        Ok(())
    }

    /// Abort the sweep task. Fails if it isn't running.
    pub(crate) fn stop(&self) -> Result<()> {
        let task = self.task.lock().take().ok_or_else(|| {
            SnowgateError::Lifecycle(format!("{} manager is not active", self.kind))
        })?;

        task.abort();
        info!(kind = self.kind, "Stopped bucket sweep");
        Ok(())
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_zero_interval_rejected() {
        let err = Sweeper::new("test", Duration::ZERO).err().unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let sweeper = Sweeper::with_default_interval("test");
        let err = sweeper.start(|| 0).unwrap_err();
        assert!(err.is_lifecycle());
        assert!(!sweeper.is_running());
    }

    #[tokio::test]
    async fn test_double_start_and_stop_fail() {
        let sweeper = Sweeper::with_default_interval("test");
        assert!(sweeper.stop().unwrap_err().is_lifecycle());

        sweeper.start(|| 0).unwrap();
        assert!(sweeper.start(|| 0).unwrap_err().is_lifecycle());

        sweeper.stop().unwrap();
        assert!(sweeper.stop().unwrap_err().is_lifecycle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_every_interval_until_stopped() {
        let sweeper = Sweeper::new("test", Duration::from_secs(10)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        sweeper
            .start(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                0
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        sweeper.stop().unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
