//! Then stage: assertions over engine state and scenario state.
//!
//! Every assertion returns the stage on success and
//! `ScenarioError::AssertionFailure` on a mismatch, so a chain stops at the
//! first failed expectation.

mod tasks;

use chrono::{DateTime, Utc};
use serde_json::Value;

pub use self::tasks::UserTaskProperties;
use super::Services;
use super::model::ModelSelection;
use super::state::ScenarioState;
use crate::engine::{
    DefinitionRepository, EngineClient, HistoricTask, HistoryService, RuntimeService, TaskService,
    Variables,
};
use crate::error::ScenarioError;

/// Asserts on the engine and on what the scenario has recorded.
pub struct Then<'a> {
    services: &'a Services,
    state: &'a mut ScenarioState,
}

impl std::fmt::Debug for Then<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Then")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn expect_count(what: &str, expected: usize, actual: usize) -> Result<(), ScenarioError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScenarioError::assertion(format!(
            "expected {expected} {what}, found {actual}"
        )))
    }
}

impl<'a> Then<'a> {
    pub(crate) const fn new(services: &'a Services, state: &'a mut ScenarioState) -> Self {
        Self { services, state }
    }

    fn engine(&self) -> &dyn EngineClient {
        self.services.engine.as_ref()
    }

    /// The state the assertions read.
    #[must_use]
    pub fn state(&self) -> &ScenarioState {
        &*self.state
    }

    // -- Definitions

    /// Exactly `count` process definitions are deployed.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn deployed_process_definitions(self, count: usize) -> Result<Self, ScenarioError> {
        let definitions = self.engine().list_definitions()?;
        expect_count("deployed process definition(s)", count, definitions.len())?;
        Ok(self)
    }

    /// No process definition is deployed.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if any is deployed.
    pub fn no_deployed_process_definitions(self) -> Result<Self, ScenarioError> {
        self.deployed_process_definitions(0)
    }

    /// A definition with `key` is deployed.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is not.
    pub fn deployed_process_definition(self, key: &str) -> Result<Self, ScenarioError> {
        if self.engine().definition(key)?.is_none() {
            return Err(ScenarioError::assertion(format!(
                "process definition '{key}' is not deployed"
            )));
        }
        Ok(self)
    }

    // -- Processes

    /// Exactly `count` process instances are active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_processes(self, count: usize) -> Result<Self, ScenarioError> {
        let instances = self.engine().instances()?;
        expect_count("active process(es)", count, instances.len())?;
        Ok(self)
    }

    /// Exactly `count` instances of `key` are active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_processes_of_type(self, count: usize, key: &str) -> Result<Self, ScenarioError> {
        let instances = self.engine().instances_by_key(key)?;
        expect_count(&format!("active '{key}' process(es)"), count, instances.len())?;
        Ok(self)
    }

    /// No process instance is active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if any is.
    pub fn no_active_processes(self) -> Result<Self, ScenarioError> {
        self.active_processes(0)
    }

    /// No instance of `key` is active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if any is.
    pub fn no_active_processes_of_type(self, key: &str) -> Result<Self, ScenarioError> {
        self.active_processes_of_type(0, key)
    }

    /// Focus the process registered as `alias`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias.
    pub fn process_referenced_as(mut self, alias: &str) -> Result<Self, ScenarioError> {
        let process_id = self.state.process_aliases().resolve(alias)?.to_owned();
        self.state.focus_process(&process_id);
        Ok(self)
    }

    // -- Model selection

    /// Select the runtime variables of the focus process.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus process and
    /// engine errors if the process is no longer active.
    pub fn process_runtime(self) -> Result<Self, ScenarioError> {
        let process_id = self.state.require_process()?.to_owned();
        self.select_runtime(&process_id)
    }

    /// Select the runtime variables of the process registered as `alias`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias and
    /// engine errors if the process is no longer active.
    pub fn process_runtime_for(self, alias: &str) -> Result<Self, ScenarioError> {
        let process_id = self.state.process_aliases().resolve(alias)?.to_owned();
        self.select_runtime(&process_id)
    }

    fn select_runtime(self, process_id: &str) -> Result<Self, ScenarioError> {
        let variables = self.engine().variables(process_id)?;
        Ok(self.select(ModelSelection::Runtime(variables)))
    }

    /// Select the historic variables of the focus process.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus process.
    pub fn process_history(self) -> Result<Self, ScenarioError> {
        let process_id = self.state.require_process()?;
        let variables = self.engine().historic_process_variables(process_id)?;
        Ok(self.select(ModelSelection::History(variables)))
    }

    /// Select every value each variable of the focus process has held.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus process.
    pub fn process_history_detail(self) -> Result<Self, ScenarioError> {
        let process_id = self.state.require_process()?;
        let updates = self.engine().variable_updates(process_id)?;
        Ok(self.select(ModelSelection::detail(updates)))
    }

    /// Select the local variables of the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus task.
    pub fn task_runtime(self) -> Result<Self, ScenarioError> {
        let task_id = self.state.require_task()?;
        let variables = self.engine().local_variables(task_id)?;
        Ok(self.select(ModelSelection::TaskRuntime(variables)))
    }

    /// Select the historic local variables of the focus completed task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus completed task.
    pub fn task_history(self) -> Result<Self, ScenarioError> {
        let task_id = self.state.require_history_task()?;
        let variables = self.engine().historic_task_variables(task_id)?;
        Ok(self.select(ModelSelection::TaskHistory(variables)))
    }

    fn select(mut self, selection: ModelSelection) -> Self {
        tracing::debug!(model = selection.label(), "selected model");
        self.state.select(selection);
        self
    }

    // -- Model assertions

    /// The selected model has `key`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` with no model selected and
    /// `ScenarioError::AssertionFailure` if the key is missing.
    pub fn contains_key(self, key: &str) -> Result<Self, ScenarioError> {
        self.state.require_selection()?.check_key(key)?;
        Ok(self)
    }

    /// The selected model has `key` with a non-empty value.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key`], and on an empty value.
    pub fn contains_key_with_value(self, key: &str) -> Result<Self, ScenarioError> {
        self.state.require_selection()?.check_key_with_value(key)?;
        Ok(self)
    }

    /// The selected model has `key` with an empty value.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key`], and on a non-empty value.
    pub fn contains_key_with_empty_value(self, key: &str) -> Result<Self, ScenarioError> {
        self.state
            .require_selection()?
            .check_key_with_empty_value(key)?;
        Ok(self)
    }

    /// The selected model has every key in `keys`.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key`], for the first missing key.
    pub fn contains_keys(self, keys: &[&str]) -> Result<Self, ScenarioError> {
        let selection = self.state.require_selection()?;
        for key in keys {
            selection.check_key(key)?;
        }
        Ok(self)
    }

    /// The selected model has every key in `keys`, each with a value.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key_with_value`], for the first offending key.
    pub fn contains_keys_with_values(self, keys: &[&str]) -> Result<Self, ScenarioError> {
        let selection = self.state.require_selection()?;
        for key in keys {
            selection.check_key_with_value(key)?;
        }
        Ok(self)
    }

    /// The selected model has every key in `keys`, each empty.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key_with_empty_value`], for the first offending
    /// key.
    pub fn contains_keys_with_empty_values(self, keys: &[&str]) -> Result<Self, ScenarioError> {
        let selection = self.state.require_selection()?;
        for key in keys {
            selection.check_key_with_empty_value(key)?;
        }
        Ok(self)
    }

    /// The selected model maps `key` to `value`.
    ///
    /// # Errors
    ///
    /// As [`Then::contains_key`], and on a different value.
    pub fn contains(self, key: &str, value: impl Into<Value>) -> Result<Self, ScenarioError> {
        self.state
            .require_selection()?
            .check_entry(key, &value.into())?;
        Ok(self)
    }

    /// The selected model holds every entry of `expected`.
    ///
    /// # Errors
    ///
    /// As [`Then::contains`], for the first mismatching entry.
    pub fn contains_all(self, expected: &Variables) -> Result<Self, ScenarioError> {
        let selection = self.state.require_selection()?;
        for (key, value) in expected {
            selection.check_entry(key, value)?;
        }
        Ok(self)
    }

    // -- History

    fn completed(&self, key: Option<&str>) -> Result<Vec<HistoricTask>, ScenarioError> {
        let tasks = match key {
            Some(definition_key) => self.engine().historic_tasks_by_key(definition_key)?,
            None => self.engine().historic_tasks()?,
        };
        Ok(tasks.into_iter().filter(HistoricTask::is_ended).collect())
    }

    /// Exactly `count` tasks have ended.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn completed_tasks(self, count: usize) -> Result<Self, ScenarioError> {
        let completed = self.completed(None)?;
        expect_count("completed task(s)", count, completed.len())?;
        Ok(self)
    }

    /// Exactly `count` tasks of `key` have ended.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn completed_tasks_of_type(self, count: usize, key: &str) -> Result<Self, ScenarioError> {
        let completed = self.completed(Some(key))?;
        expect_count(&format!("completed '{key}' task(s)"), count, completed.len())?;
        Ok(self)
    }

    /// Exactly one task of `key` has ended; focus it as the completed task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` unless exactly one has.
    pub fn completed_task(mut self, key: &str) -> Result<Self, ScenarioError> {
        let completed = self.completed(Some(key))?;
        let [task] = completed.as_slice() else {
            return Err(ScenarioError::assertion(format!(
                "expected 1 completed '{key}' task, found {}",
                completed.len()
            )));
        };
        self.state.focus_history_task(&task.id);
        Ok(self)
    }

    /// The task registered as `alias` has ended; focus it as the completed
    /// task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias and
    /// `ScenarioError::AssertionFailure` if the task has not ended.
    pub fn completed_task_referenced_as(mut self, alias: &str) -> Result<Self, ScenarioError> {
        let task_id = self.state.task_aliases().resolve(alias)?.to_owned();
        let ended = self
            .engine()
            .historic_task(&task_id)?
            .is_some_and(|task| task.is_ended());
        if !ended {
            return Err(ScenarioError::assertion(format!(
                "task referenced as '{alias}' has not been completed"
            )));
        }
        self.state.focus_history_task(&task_id);
        Ok(self)
    }

    /// The focus completed task is named `name`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus completed task
    /// and `ScenarioError::AssertionFailure` on a different name.
    pub fn with_completed_task_name(self, name: &str) -> Result<Self, ScenarioError> {
        let task_id = self.state.require_history_task()?;
        let task = self.engine().historic_task(task_id)?.ok_or_else(|| {
            ScenarioError::assertion(format!("completed task '{task_id}' is not in history"))
        })?;
        if task.name != name {
            return Err(ScenarioError::assertion(format!(
                "completed task '{}' is named '{}', expected '{name}'",
                task.definition_key, task.name
            )));
        }
        Ok(self)
    }

    // -- Activities

    fn visited(&self, reference: &str) -> Result<bool, ScenarioError> {
        let process_id = self.state.require_process()?;
        Ok(self
            .engine()
            .activity_instances(process_id)?
            .iter()
            .any(|activity| activity.matches(reference)))
    }

    /// The focus process has executed the activity named or identified by
    /// `reference`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it has not.
    pub fn with_activity(self, reference: &str) -> Result<Self, ScenarioError> {
        if !self.visited(reference)? {
            return Err(ScenarioError::assertion(format!(
                "process did not pass activity '{reference}'"
            )));
        }
        Ok(self)
    }

    /// The focus process has not executed `reference`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it has.
    pub fn without_activity(self, reference: &str) -> Result<Self, ScenarioError> {
        if self.visited(reference)? {
            return Err(ScenarioError::assertion(format!(
                "process unexpectedly passed activity '{reference}'"
            )));
        }
        Ok(self)
    }

    /// The focus process has executed every activity in `references`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` for the first one it has not.
    pub fn with_activities(self, references: &[&str]) -> Result<Self, ScenarioError> {
        references
            .iter()
            .try_fold(self, |stage, reference| stage.with_activity(reference))
    }

    // -- Captured errors and results

    /// An engine error has been captured.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if none has.
    pub fn engine_error_captured(self) -> Result<Self, ScenarioError> {
        if self.state.captured_error().is_none() {
            return Err(ScenarioError::assertion("expected a captured engine error"));
        }
        Ok(self)
    }

    /// No engine error has been captured.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if one has.
    pub fn no_engine_error_captured(self) -> Result<Self, ScenarioError> {
        if let Some(error) = self.state.captured_error() {
            return Err(ScenarioError::assertion(format!(
                "unexpected captured engine error: {error}"
            )));
        }
        Ok(self)
    }

    /// The captured engine error's message contains `text`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if nothing was captured or
    /// the message does not contain `text`.
    pub fn captured_error_contains(self, text: &str) -> Result<Self, ScenarioError> {
        let message = self
            .state
            .captured_error()
            .map(ToString::to_string)
            .ok_or_else(|| ScenarioError::assertion("expected a captured engine error"))?;
        if !message.contains(text) {
            return Err(ScenarioError::assertion(format!(
                "captured error '{message}' does not contain '{text}'"
            )));
        }
        Ok(self)
    }

    /// The latest "with result" correlation started a process of `key`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if no correlation result is
    /// recorded or it names another definition.
    pub fn correlated_process(self, key: &str) -> Result<Self, ScenarioError> {
        let result = self
            .state
            .correlation_result()
            .ok_or_else(|| ScenarioError::assertion("no correlation result recorded"))?;
        if result.definition_key != key {
            return Err(ScenarioError::assertion(format!(
                "correlation started '{}', expected '{key}'",
                result.definition_key
            )));
        }
        Ok(self)
    }

    // -- Clock

    /// The engine clock reads `time`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different time.
    pub fn clock_reads(self, time: DateTime<Utc>) -> Result<Self, ScenarioError> {
        let now = self.services.clock.now()?;
        if now != time {
            return Err(ScenarioError::assertion(format!(
                "clock reads {now}, expected {time}"
            )));
        }
        Ok(self)
    }
}
