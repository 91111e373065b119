//! Blocking drain of the engine's asynchronous job queue.
//!
//! A drain repeatedly executes due jobs and re-reads the pending count,
//! pausing one poll interval between checks, until nothing is pending or the
//! cumulative pause time reaches the timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{DrainConfig, TimeoutPolicy};
use crate::engine::JobExecutor;
use crate::error::ScenarioError;

/// Timing and timeout behaviour of a [`JobDrainer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// Upper bound on the cumulative pause time.
    pub timeout: Duration,
    /// Pause between two polls.
    pub poll_interval: Duration,
    /// What to do when the timeout elapses with jobs pending.
    pub on_timeout: TimeoutPolicy,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self::from(&DrainConfig::default())
    }
}

impl From<&DrainConfig> for DrainSettings {
    fn from(config: &DrainConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            on_timeout: config.on_timeout,
        }
    }
}

/// How a drain waits between polls.
pub trait Pause: Send + Sync {
    /// Block the calling thread for `duration`.
    fn pause(&self, duration: Duration);
}

/// Pauses by sleeping the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Result of a drain that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The engine reported zero pending jobs.
    Quiescent {
        /// Jobs executed during the drain.
        executed: u64,
    },
    /// The timeout elapsed under [`TimeoutPolicy::Continue`].
    TimedOut {
        /// Jobs still pending at the last poll.
        pending: u64,
    },
}

/// Waits for the engine's job queue to empty.
#[derive(Clone)]
pub struct JobDrainer {
    executor: Arc<dyn JobExecutor>,
    settings: DrainSettings,
    pause: Arc<dyn Pause>,
}

impl std::fmt::Debug for JobDrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDrainer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl JobDrainer {
    /// Create a drainer that sleeps the thread between polls.
    #[must_use]
    pub fn new(executor: Arc<dyn JobExecutor>, settings: DrainSettings) -> Self {
        Self {
            executor,
            settings,
            pause: Arc::new(ThreadPause),
        }
    }

    /// Replace the way the drainer waits between polls.
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    /// The settings this drainer runs with.
    #[must_use]
    pub const fn settings(&self) -> DrainSettings {
        self.settings
    }

    /// Block until no jobs are pending or the timeout elapses.
    ///
    /// Returns on the first check, without pausing, when nothing is pending.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::EngineOperation` if the engine fails to execute
    /// or count jobs, and `ScenarioError::DrainTimeout` if the timeout elapses
    /// under [`TimeoutPolicy::Fail`].
    pub fn drain(&self) -> Result<DrainOutcome, ScenarioError> {
        let DrainSettings {
            timeout,
            poll_interval,
            on_timeout,
        } = self.settings;
        let mut waited = Duration::ZERO;
        let mut executed = 0_u64;

        loop {
            executed = executed.saturating_add(self.executor.execute_due()?);
            let pending = self.executor.pending_count()?;
            if pending == 0 {
                tracing::debug!(executed, "job queue drained");
                return Ok(DrainOutcome::Quiescent { executed });
            }

            if waited >= timeout || poll_interval.is_zero() {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                return match on_timeout {
                    TimeoutPolicy::Continue => {
                        tracing::warn!(pending, waited_ms, "drain timed out with jobs pending");
                        Ok(DrainOutcome::TimedOut { pending })
                    }
                    TimeoutPolicy::Fail => Err(ScenarioError::DrainTimeout { pending, waited_ms }),
                };
            }

            tracing::debug!(pending, "waiting for pending jobs");
            self.pause.pause(poll_interval);
            waited = waited.saturating_add(poll_interval);
        }
    }
}
