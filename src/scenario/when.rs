//! When stage: mutating engine actions followed by a job drain.
//!
//! Engine errors raised by an action are captured into scenario state by
//! default so that a later Then step can assert on them. A propagating
//! stage returns them as `ScenarioError::EngineOperation` instead. Query
//! failures, alias lookups, and precondition checks always propagate.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use super::Services;
use super::state::{ScenarioState, StartMarker};
use crate::engine::{
    EngineClient, EngineResult, MessageCorrelator, RuntimeService, Task, TaskService, Variables,
};
use crate::error::ScenarioError;
use crate::jobs::BackgroundHandle;

/// Performs actions against the engine.
pub struct When<'a> {
    services: &'a Services,
    state: &'a mut ScenarioState,
    capture_errors: bool,
}

impl std::fmt::Debug for When<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("When")
            .field("state", &self.state)
            .field("capture_errors", &self.capture_errors)
            .finish_non_exhaustive()
    }
}

impl<'a> When<'a> {
    pub(crate) const fn new(services: &'a Services, state: &'a mut ScenarioState) -> Self {
        let capture_errors = services.config.capture_engine_errors;
        Self {
            services,
            state,
            capture_errors,
        }
    }

    /// Return engine errors from actions instead of capturing them.
    pub const fn propagating(mut self) -> Self {
        self.capture_errors = false;
        self
    }

    /// Capture engine errors from actions into scenario state.
    pub const fn capturing(mut self) -> Self {
        self.capture_errors = true;
        self
    }

    fn engine(&self) -> &dyn EngineClient {
        self.services.engine.as_ref()
    }

    /// Capture or propagate the error of an action; `None` means captured.
    fn settle<T>(&mut self, result: EngineResult<T>) -> Result<Option<T>, ScenarioError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(error) if self.capture_errors => {
                self.state.capture(error);
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn drain(&self) -> Result<(), ScenarioError> {
        self.services.drainer.drain().map(|_| ())
    }

    // -- Processes

    /// Start a process of `key` with the Given business key and payload.
    ///
    /// The start position follows the Given marker: before an activity,
    /// after an activity, or at the start event.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn create_a_process(self, key: &str) -> Result<Self, ScenarioError> {
        let business_key = self.state.business_key().map(str::to_owned);
        self.start_process(key, business_key.as_deref())
    }

    /// Start a process of `key` with an explicit business key.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn create_a_process_with_business_key(
        self,
        key: &str,
        business_key: &str,
    ) -> Result<Self, ScenarioError> {
        self.start_process(key, Some(business_key))
    }

    fn start_process(
        mut self,
        key: &str,
        business_key: Option<&str>,
    ) -> Result<Self, ScenarioError> {
        let engine = self.engine();
        let model = self.state.model();
        let started = match self.state.start_marker() {
            Some(StartMarker::Before(activity)) => {
                engine.start_before_activity(key, business_key, activity, model)
            }
            Some(StartMarker::After(activity)) => {
                engine.start_after_activity(key, business_key, activity, model)
            }
            None => engine.start(key, business_key, model),
        };
        if let Some(process_id) = self.settle(started)? {
            tracing::info!(key, process_id = %process_id, "created process");
            self.state.focus_process(&process_id);
        }
        self.drain()?;
        Ok(self)
    }

    /// Start a process through the message start event `message`, with the
    /// Given business key and payload.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn create_a_process_by_message(mut self, message: &str) -> Result<Self, ScenarioError> {
        let started = self.engine().correlate_start_message(
            message,
            self.state.business_key(),
            self.state.model(),
        );
        if let Some(process_id) = self.settle(started)? {
            tracing::info!(message, process_id = %process_id, "created process by message");
            self.state.focus_process(&process_id);
        }
        self.drain()?;
        Ok(self)
    }

    /// Start a process through `message` with the Given payload and keep the
    /// correlation result in scenario state.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn create_a_process_by_message_with_result(
        mut self,
        message: &str,
    ) -> Result<Self, ScenarioError> {
        let correlated = self
            .engine()
            .correlate_start_message_with_result(message, self.state.model());
        if let Some(result) = self.settle(correlated)? {
            tracing::info!(message, process_id = %result.process_instance_id, "created process by message");
            self.state.focus_process(&result.process_instance_id);
            self.state.set_correlation_result(result);
        }
        self.drain()?;
        Ok(self)
    }

    /// Register the focus process under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus process and
    /// `ScenarioError::AliasConflict` if `name` is taken.
    pub fn referenced_as(mut self, name: &str) -> Result<Self, ScenarioError> {
        self.state.register_process_alias(name)?;
        Ok(self)
    }

    /// Write `variables` into the focus process.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus process, engine
    /// errors when propagating, and drain failures.
    pub fn set_variables(self, variables: &Variables) -> Result<Self, ScenarioError> {
        let process_id = self.state.require_process()?.to_owned();
        self.write_variables(&process_id, variables)
    }

    /// Write `variables` into the process registered as `alias`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias, engine
    /// errors when propagating, and drain failures.
    pub fn set_variables_for(self, alias: &str, variables: &Variables) -> Result<Self, ScenarioError> {
        let process_id = self.state.process_aliases().resolve(alias)?.to_owned();
        self.write_variables(&process_id, variables)
    }

    fn write_variables(
        mut self,
        process_id: &str,
        variables: &Variables,
    ) -> Result<Self, ScenarioError> {
        let written = self.engine().set_variables(process_id, variables);
        if self.settle(written)?.is_some() {
            tracing::info!(process_id, count = variables.len(), "set process variables");
        }
        self.drain()?;
        Ok(self)
    }

    // -- Tasks

    /// Complete the single active task with definition key `key`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::PreconditionFailed` unless exactly one such
    /// task is active, engine errors when propagating, and drain failures.
    pub fn complete_task(self, key: &str) -> Result<Self, ScenarioError> {
        self.complete_task_with(key, &Variables::new())
    }

    /// Complete the single active task with definition key `key`, passing
    /// `variables`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::PreconditionFailed` unless exactly one such
    /// task is active, engine errors when propagating, and drain failures.
    pub fn complete_task_with(
        mut self,
        key: &str,
        variables: &Variables,
    ) -> Result<Self, ScenarioError> {
        let tasks = self.engine().tasks_by_definition_key(key)?;
        let [task] = tasks.as_slice() else {
            return Err(ScenarioError::PreconditionFailed {
                message: format!(
                    "expected exactly 1 active task '{key}', found {}",
                    tasks.len()
                ),
            });
        };
        self.complete_one(task, variables)?;
        self.drain()?;
        Ok(self)
    }

    /// Complete the task registered as `alias` in a Then stage.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias, engine
    /// errors when propagating, and drain failures.
    pub fn complete_task_referenced_as(
        mut self,
        alias: &str,
        variables: &Variables,
    ) -> Result<Self, ScenarioError> {
        let task_id = self.state.task_aliases().resolve(alias)?.to_owned();
        let completed = self.engine().complete(&task_id, variables);
        if self.settle(completed)?.is_some() {
            tracing::info!(alias, task_id = %task_id, "completed task");
        }
        self.drain()?;
        Ok(self)
    }

    /// Complete every active task with definition key `key`.
    ///
    /// Every task is attempted. When capturing, each failure overwrites the
    /// previous one, so only the last failure remains in scenario state.
    ///
    /// # Errors
    ///
    /// Returns the first engine error when propagating, and drain failures.
    pub fn complete_all_tasks(mut self, key: &str) -> Result<Self, ScenarioError> {
        let tasks = self.engine().tasks_by_definition_key(key)?;
        for task in &tasks {
            self.complete_one(task, &Variables::new())?;
        }
        self.drain()?;
        Ok(self)
    }

    /// Complete every active task, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn complete_tasks(self) -> Result<Self, ScenarioError> {
        let tasks = self.engine().tasks()?;
        self.complete_until_failure(&tasks, &Variables::new())
    }

    /// Complete every active task of `key`, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn complete_tasks_of_type(self, key: &str) -> Result<Self, ScenarioError> {
        self.complete_tasks_of_type_with(key, &Variables::new())
    }

    /// Complete every active task of `key` with `variables`, stopping at the
    /// first failure.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn complete_tasks_of_type_with(
        self,
        key: &str,
        variables: &Variables,
    ) -> Result<Self, ScenarioError> {
        let tasks = self.engine().tasks_by_definition_key(key)?;
        self.complete_until_failure(&tasks, variables)
    }

    /// Complete every active task whose definition key is in `keys`, in the
    /// order given, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns engine errors when propagating, and drain failures.
    pub fn complete_tasks_of_types(self, keys: &[&str]) -> Result<Self, ScenarioError> {
        let mut tasks = Vec::new();
        for key in keys {
            tasks.extend(self.engine().tasks_by_definition_key(key)?);
        }
        self.complete_until_failure(&tasks, &Variables::new())
    }

    fn complete_until_failure(
        mut self,
        tasks: &[Task],
        variables: &Variables,
    ) -> Result<Self, ScenarioError> {
        for task in tasks {
            if !self.complete_one(task, variables)? {
                break;
            }
        }
        self.drain()?;
        Ok(self)
    }

    /// Complete `task`; `false` means the failure was captured.
    fn complete_one(&mut self, task: &Task, variables: &Variables) -> Result<bool, ScenarioError> {
        let completed = self.engine().complete(&task.id, variables);
        let succeeded = self.settle(completed)?.is_some();
        if succeeded {
            tracing::info!(key = %task.definition_key, task_id = %task.id, "completed task");
        }
        Ok(succeeded)
    }

    // -- Arbitrary actions, clock, background work

    /// Run `action` against the engine, then drain.
    ///
    /// # Errors
    ///
    /// Returns the action's error when propagating, and drain failures.
    pub fn execute<F>(mut self, description: &str, action: F) -> Result<Self, ScenarioError>
    where
        F: FnOnce(&dyn EngineClient) -> EngineResult<()>,
    {
        tracing::info!(action = description, "execute");
        let outcome = action(self.engine());
        self.settle(outcome)?;
        self.drain()?;
        Ok(self)
    }

    /// Move the engine clock forward by `duration` and drain the jobs that
    /// fell due.
    ///
    /// # Errors
    ///
    /// Propagates clock and drain failures.
    pub fn advance_clock(self, duration: TimeDelta) -> Result<Self, ScenarioError> {
        self.services.clock.advance(duration, true)?;
        Ok(self)
    }

    /// Set the engine clock to `time` and drain the jobs that fell due.
    ///
    /// # Errors
    ///
    /// Propagates clock and drain failures.
    pub fn set_clock(self, time: DateTime<Utc>) -> Result<Self, ScenarioError> {
        self.services.clock.set_to(time, true)?;
        Ok(self)
    }

    /// Drain the engine's job queue.
    ///
    /// # Errors
    ///
    /// Propagates drain failures.
    pub fn jobs_are_drained(self) -> Result<Self, ScenarioError> {
        self.drain()?;
        Ok(self)
    }

    /// Run `job` on the background pool with a handle to the engine.
    ///
    /// The job's failures are logged. Join the returned handle to observe
    /// them; drop it to leave the log as the only trace.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::Background` if the pool cannot be started.
    pub fn schedule<F>(self, label: &str, job: F) -> Result<BackgroundHandle, ScenarioError>
    where
        F: FnOnce(Arc<dyn EngineClient>) -> eyre::Result<()> + Send + 'static,
    {
        let engine = Arc::clone(&self.services.engine);
        self.services
            .background
            .schedule(label, move || job(engine))
    }
}
