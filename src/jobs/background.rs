//! Bounded pool for work submitted in the background of a scenario.
//!
//! Jobs run on the blocking pool of a `tokio` multi-thread runtime that is
//! built on first use and capped at the configured worker count. Every
//! failure is logged where it happens. Callers that keep the returned
//! [`BackgroundHandle`] can also join it and observe the outcome; dropping
//! the handle leaves the log entry as the only trace.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::ScenarioError;

/// Grace period for running jobs when the scheduler is dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs background jobs on a lazily started, bounded pool.
#[derive(Debug)]
pub struct BackgroundScheduler {
    workers: usize,
    runtime: Mutex<Option<Runtime>>,
}

impl BackgroundScheduler {
    /// Create a scheduler that will run at most `workers` jobs at once.
    ///
    /// No threads are started until the first job is scheduled.
    #[must_use]
    pub const fn new(workers: usize) -> Self {
        Self {
            workers,
            runtime: Mutex::new(None),
        }
    }

    /// Maximum number of jobs running at the same time.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Whether the worker pool has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.runtime
            .lock()
            .is_ok_and(|runtime| runtime.is_some())
    }

    fn handle(&self) -> Result<Handle, ScenarioError> {
        let mut slot = self.runtime.lock().map_err(|_| ScenarioError::Background {
            message: String::from("scheduler lock poisoned"),
        })?;
        if let Some(runtime) = slot.as_ref() {
            return Ok(runtime.handle().clone());
        }

        let workers = self.workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("procspec-background")
            .build()
            .map_err(|e| ScenarioError::Background {
                message: format!("failed to start worker pool: {e}"),
            })?;
        tracing::debug!(workers, "started background worker pool");
        let handle = runtime.handle().clone();
        *slot = Some(runtime);
        Ok(handle)
    }

    /// Submit `job` to the pool.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::Background` if the worker pool cannot be
    /// started.
    pub fn schedule<F>(&self, label: &str, job: F) -> Result<BackgroundHandle, ScenarioError>
    where
        F: FnOnce() -> eyre::Result<()> + Send + 'static,
    {
        let handle = self.handle()?;
        let job_label = label.to_owned();
        let join = handle.spawn_blocking(move || run_logged(&job_label, job));
        tracing::info!(job = label, "scheduled background job");
        Ok(BackgroundHandle {
            label: label.to_owned(),
            runtime: handle,
            join,
        })
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        let runtime = match self.runtime.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(started) = runtime {
            started.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

fn run_logged<F>(label: &str, job: F) -> eyre::Result<()>
where
    F: FnOnce() -> eyre::Result<()>,
{
    let outcome = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| String::from("unknown panic payload"));
        Err(eyre::eyre!("job panicked: {reason}"))
    });
    if let Err(report) = &outcome {
        tracing::error!(job = label, error = %report, "background job failed");
    }
    outcome
}

/// A job submitted to a [`BackgroundScheduler`].
#[derive(Debug)]
pub struct BackgroundHandle {
    label: String,
    runtime: Handle,
    join: JoinHandle<eyre::Result<()>>,
}

impl BackgroundHandle {
    /// The label the job was scheduled with.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the job has finished, successfully or not.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Block until the job finishes.
    ///
    /// Must not be called from inside an asynchronous context.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::Background` if the job returned an error,
    /// panicked, or was cancelled.
    pub fn join(self) -> Result<(), ScenarioError> {
        let Self {
            label,
            runtime,
            join,
        } = self;
        match runtime.block_on(join) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(report)) => Err(ScenarioError::Background {
                message: format!("{label}: {report}"),
            }),
            Err(e) => Err(ScenarioError::Background {
                message: format!("{label}: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn scheduler() -> BackgroundScheduler {
        BackgroundScheduler::new(2)
    }

    #[rstest]
    fn pool_starts_on_first_job(scheduler: BackgroundScheduler) {
        assert!(!scheduler.is_started());

        let handle = scheduler
            .schedule("noop", || Ok(()))
            .expect("schedule should succeed");

        assert!(scheduler.is_started());
        assert_eq!(handle.label(), "noop");
        handle.join().expect("job should succeed");
    }

    #[rstest]
    fn join_reports_job_errors(scheduler: BackgroundScheduler) {
        let handle = scheduler
            .schedule("failing", || Err(eyre::eyre!("engine refused message")))
            .expect("schedule should succeed");

        let error = handle.join().expect_err("job error should surface on join");

        assert_eq!(
            error.to_string(),
            "background job failed: failing: engine refused message"
        );
    }

    #[rstest]
    fn join_reports_panics(scheduler: BackgroundScheduler) {
        let handle = scheduler
            .schedule("panicking", || panic!("boom"))
            .expect("schedule should succeed");

        let error = handle.join().expect_err("panic should surface on join");

        assert!(error.to_string().contains("job panicked: boom"));
    }

    #[rstest]
    fn dropped_handle_still_runs_job(scheduler: BackgroundScheduler) {
        let (sender, receiver) = mpsc::channel();

        drop(
            scheduler
                .schedule("fire-and-forget", move || {
                    sender.send(42_u32)?;
                    Err(eyre::eyre!("only logged"))
                })
                .expect("schedule should succeed"),
        );

        let value = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("job should run without a handle");
        assert_eq!(value, 42);
    }
}
