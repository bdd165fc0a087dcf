//! Background sweep of expired store entries.
//!
//! The reaper only bounds memory; admission decisions never depend on it. It is an
//! owned lifecycle object: nothing runs until [`Reaper::start`], and
//! [`Reaper::stop`] joins the task so shutdown and tests can halt it deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::store::RateLimitStore;

/// Sweep period used when none is configured.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Errors from reaper lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaperError {
    /// A zero period would spin.
    #[error("reaper interval must be > 0")]
    InvalidInterval,
    /// `start` was called twice without `stop`.
    #[error("reaper is already running")]
    AlreadyRunning,
    /// `start` was called outside a tokio runtime.
    #[error("reaper must be started from within a tokio runtime")]
    NoRuntime,
}

#[derive(Debug)]
struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Periodic `cleanup()` driver for a shared [`RateLimitStore`].
#[derive(Debug)]
pub struct Reaper {
    store: Arc<RateLimitStore>,
    interval: Duration,
    running: Option<Running>,
}

impl Reaper {
    /// Create an idle reaper sweeping `store` every `interval`.
    pub fn new(store: Arc<RateLimitStore>, interval: Duration) -> Result<Self, ReaperError> {
        if interval.is_zero() {
            return Err(ReaperError::InvalidInterval);
        }
        Ok(Self { store, interval, running: None })
    }

    pub(crate) fn with_default_interval(store: Arc<RateLimitStore>) -> Self {
        Self { store, interval: DEFAULT_REAPER_INTERVAL, running: None }
    }

    /// Configured sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True between a successful `start` and the matching `stop`.
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.task.is_finished())
    }

    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// The first sweep happens one interval after start.
    pub fn start(&mut self) -> Result<(), ReaperError> {
        if self.is_running() {
            return Err(ReaperError::AlreadyRunning);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ReaperError::NoRuntime)?;
        let (shutdown, signal) = oneshot::channel();
        let task = handle.spawn(sweep_loop(self.store.clone(), self.interval, signal));
        info!(
            target: "ratewindow::reaper",
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "reaper started"
        );
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Signal the task and wait for it to exit. No-op when idle.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        // The task may already have exited; a closed channel is fine.
        let _ = running.shutdown.send(());
        if let Err(err) = running.task.await {
            warn!(target: "ratewindow::reaper", error = %err, "reaper task ended abnormally");
        }
        info!(target: "ratewindow::reaper", "reaper stopped");
    }

    /// Sweep once on the caller's thread.
    pub fn sweep_now(&self) -> usize {
        self.store.cleanup()
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

async fn sweep_loop(store: Arc<RateLimitStore>, period: Duration, mut shutdown: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            // Fires on an explicit stop and when the sender is dropped.
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let removed = store.cleanup();
                debug!(target: "ratewindow::reaper", removed, "sweep complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        let err = Reaper::new(Arc::new(RateLimitStore::new()), Duration::ZERO).unwrap_err();
        assert_eq!(err, ReaperError::InvalidInterval);
    }

    #[test]
    fn start_outside_runtime_errors() {
        let mut reaper = Reaper::new(Arc::new(RateLimitStore::new()), DEFAULT_REAPER_INTERVAL).unwrap();
        assert_eq!(reaper.start(), Err(ReaperError::NoRuntime));
        assert!(!reaper.is_running());
    }

    #[tokio::test]
    async fn double_start_errors_and_stop_is_idempotent() {
        let mut reaper = Reaper::new(Arc::new(RateLimitStore::new()), DEFAULT_REAPER_INTERVAL).unwrap();
        reaper.start().unwrap();
        assert!(reaper.is_running());
        assert_eq!(reaper.start(), Err(ReaperError::AlreadyRunning));

        reaper.stop().await;
        assert!(!reaper.is_running());
        reaper.stop().await;

        // Restartable after stop.
        reaper.start().unwrap();
        assert!(reaper.is_running());
        reaper.stop().await;
    }

    #[test]
    fn default_interval_is_five_minutes() {
        assert_eq!(DEFAULT_REAPER_INTERVAL, Duration::from_secs(300));
    }
}
