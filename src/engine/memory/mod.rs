//! In-memory engine for sequential process models.
//!
//! [`InMemoryEngine`] implements every trait of the engine client contract.
//! It keeps all state behind one mutex, so a single instance can be shared
//! between a scenario and its background jobs through an `Arc`.
//!
//! Time starts out as wall-clock time. Once pinned through
//! [`EngineClock::set_now`] it stays fixed until moved again or reset,
//! which makes timer behaviour fully deterministic in tests.

mod model;
mod state;


use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

pub use model::{Activity, ActivityKind, END_EVENT_ID, ProcessModel, START_EVENT_ID, UserTaskSpec};

use self::state::{EngineState, Entry};
use super::{
    ActivityInstance, Comment, CorrelationResult, DefinitionRepository, EngineClock, EngineResult,
    HistoricTask, HistoryService, JobExecutor, MessageCorrelator, ProcessDefinition,
    ProcessInstance, RuntimeService, Task, TaskService, VariableUpdate, Variables,
};
use crate::error::{EngineError, EngineObject};

/// An engine that runs deployed [`ProcessModel`]s in memory.
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine").finish_non_exhaustive()
    }
}

impl InMemoryEngine {
    /// Create an engine with nothing deployed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> EngineResult<MutexGuard<'_, EngineState>> {
        self.state.lock().map_err(|_| EngineError::Unavailable {
            message: String::from("engine state lock poisoned"),
        })
    }

    /// Deploy `model`, replacing any earlier version with the same key.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine state is poisoned.
    pub fn deploy(&self, model: ProcessModel) -> EngineResult<ProcessDefinition> {
        let definition = self.lock()?.deploy(model);
        tracing::debug!(key = %definition.key, version = definition.version, "deployed process definition");
        Ok(definition)
    }

    /// Attach a comment to an active task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the task is not active.
    pub fn add_task_comment(&self, task_id: &str, message: &str) -> EngineResult<Comment> {
        self.lock()?.add_comment(task_id, message)
    }
}

impl DefinitionRepository for InMemoryEngine {
    fn list_definitions(&self) -> EngineResult<Vec<ProcessDefinition>> {
        Ok(self.lock()?.definitions())
    }

    fn definition(&self, key: &str) -> EngineResult<Option<ProcessDefinition>> {
        Ok(self.lock()?.definition(key))
    }
}

impl RuntimeService for InMemoryEngine {
    fn start(
        &self,
        key: &str,
        business_key: Option<&str>,
        variables: &Variables,
    ) -> EngineResult<String> {
        self.lock()?
            .start(key, business_key, variables, Entry::Start)
    }

    fn start_before_activity(
        &self,
        key: &str,
        business_key: Option<&str>,
        activity_id: &str,
        variables: &Variables,
    ) -> EngineResult<String> {
        self.lock()?
            .start(key, business_key, variables, Entry::Before(activity_id))
    }

    fn start_after_activity(
        &self,
        key: &str,
        business_key: Option<&str>,
        activity_id: &str,
        variables: &Variables,
    ) -> EngineResult<String> {
        self.lock()?
            .start(key, business_key, variables, Entry::After(activity_id))
    }

    fn instances(&self) -> EngineResult<Vec<ProcessInstance>> {
        Ok(self.lock()?.instances())
    }

    fn instances_by_key(&self, key: &str) -> EngineResult<Vec<ProcessInstance>> {
        let mut instances = self.instances()?;
        instances.retain(|instance| instance.definition_key == key);
        Ok(instances)
    }

    fn delete(&self, id: &str, reason: &str) -> EngineResult<()> {
        self.lock()?.delete(id, reason)
    }

    fn variables(&self, scope_id: &str) -> EngineResult<Variables> {
        self.lock()?.variables(scope_id)
    }

    fn set_variables(&self, scope_id: &str, variables: &Variables) -> EngineResult<()> {
        self.lock()?.write_variables(scope_id, variables)
    }
}

impl TaskService for InMemoryEngine {
    fn tasks(&self) -> EngineResult<Vec<Task>> {
        Ok(self.lock()?.tasks())
    }

    fn tasks_by_definition_key(&self, key: &str) -> EngineResult<Vec<Task>> {
        let mut tasks = self.tasks()?;
        tasks.retain(|task| task.definition_key == key);
        Ok(tasks)
    }

    fn task(&self, id: &str) -> EngineResult<Option<Task>> {
        Ok(self.lock()?.task(id))
    }

    fn complete(&self, id: &str, variables: &Variables) -> EngineResult<()> {
        self.lock()?.complete(id, variables)
    }

    fn local_variables(&self, id: &str) -> EngineResult<Variables> {
        self.lock()?.local_variables(id)
    }

    fn assignees(&self, id: &str) -> EngineResult<Vec<String>> {
        self.lock()?.assignees(id)
    }

    fn candidate_users(&self, id: &str) -> EngineResult<Vec<String>> {
        self.lock()?.candidate_users(id)
    }

    fn candidate_groups(&self, id: &str) -> EngineResult<Vec<String>> {
        self.lock()?.candidate_groups(id)
    }

    fn comments(&self, id: &str) -> EngineResult<Vec<Comment>> {
        self.lock()?.comments(id)
    }
}

impl HistoryService for InMemoryEngine {
    fn historic_tasks(&self) -> EngineResult<Vec<HistoricTask>> {
        Ok(self.lock()?.historic_tasks())
    }

    fn historic_tasks_by_key(&self, key: &str) -> EngineResult<Vec<HistoricTask>> {
        let mut tasks = self.historic_tasks()?;
        tasks.retain(|task| task.definition_key == key);
        Ok(tasks)
    }

    fn historic_task(&self, id: &str) -> EngineResult<Option<HistoricTask>> {
        Ok(self
            .historic_tasks()?
            .into_iter()
            .find(|task| task.id == id))
    }

    fn activity_instances(&self, process_id: &str) -> EngineResult<Vec<ActivityInstance>> {
        Ok(self.lock()?.activity_instances(process_id))
    }

    fn historic_process_variables(&self, process_id: &str) -> EngineResult<Variables> {
        self.lock()?.historic_process_variables(process_id)
    }

    fn variable_updates(&self, process_id: &str) -> EngineResult<Vec<VariableUpdate>> {
        self.lock()?.variable_updates(process_id)
    }

    fn historic_task_variables(&self, task_id: &str) -> EngineResult<Variables> {
        self.lock()?.historic_task_variables(task_id)
    }
}

impl MessageCorrelator for InMemoryEngine {
    fn correlate_start_message(
        &self,
        name: &str,
        business_key: Option<&str>,
        variables: &Variables,
    ) -> EngineResult<String> {
        let mut state = self.lock()?;
        let key = state
            .definition_for_message(name)
            .ok_or_else(|| EngineError::NotFound {
                kind: EngineObject::Message,
                id: name.to_owned(),
            })?;
        state.start(&key, business_key, variables, Entry::Start)
    }

    fn correlate_start_message_with_result(
        &self,
        name: &str,
        variables: &Variables,
    ) -> EngineResult<CorrelationResult> {
        let process_instance_id = self.correlate_start_message(name, None, variables)?;
        let state = self.lock()?;
        let definition_key = state
            .definition_for_message(name)
            .unwrap_or_default();
        // The instance may already have run to its end event.
        let variables = state
            .variables(&process_instance_id)
            .or_else(|_| state.historic_process_variables(&process_instance_id))?;
        Ok(CorrelationResult {
            process_instance_id,
            definition_key,
            business_key: None,
            variables,
        })
    }
}

impl JobExecutor for InMemoryEngine {
    fn pending_count(&self) -> EngineResult<u64> {
        Ok(self.lock()?.pending_count())
    }

    fn execute_due(&self) -> EngineResult<u64> {
        self.lock()?.execute_due()
    }
}

impl EngineClock for InMemoryEngine {
    fn now(&self) -> EngineResult<DateTime<Utc>> {
        Ok(self.lock()?.now())
    }

    fn set_now(&self, time: DateTime<Utc>) -> EngineResult<()> {
        self.lock()?.pin_time(Some(time));
        Ok(())
    }

    fn reset(&self) -> EngineResult<()> {
        self.lock()?.pin_time(None);
        Ok(())
    }
}
