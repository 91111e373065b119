//! Engine client contract.
//!
//! The scenario core never talks to a workflow engine directly. It consumes
//! the traits in this module, one per engine area, so that an embedded engine
//! (or a test double) only has to implement the calls it is asked for:
//!
//! - [`DefinitionRepository`]: deployed process definitions
//! - [`RuntimeService`]: process instances and their variables
//! - [`TaskService`]: active user tasks
//! - [`HistoryService`]: historic tasks, activities, and variables
//! - [`MessageCorrelator`]: message start events
//! - [`JobExecutor`]: the asynchronous job queue
//! - [`EngineClock`]: the simulated "current time" the scheduler consults
//!
//! [`EngineClient`] is the union of all of them and is implemented for every
//! type that implements each area trait. All calls are synchronous.
//!
//! The [`memory`] module provides an in-memory engine implementing the full
//! contract for sequential process models.

pub mod memory;
mod types;

use chrono::{DateTime, Utc};

pub use types::{
    ActivityInstance, ActivityType, Comment, CorrelationResult, HistoricTask, ProcessDefinition,
    ProcessInstance, Task, VariableUpdate, Variables,
};

use crate::error::EngineError;

/// Result type for engine client calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Read access to deployed process definitions.
pub trait DefinitionRepository: Send + Sync {
    /// List the latest version of every deployed definition.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn list_definitions(&self) -> EngineResult<Vec<ProcessDefinition>>;

    /// Look up the latest version of the definition with `key`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn definition(&self, key: &str) -> EngineResult<Option<ProcessDefinition>>;
}

/// Process instance lifecycle and process variables.
pub trait RuntimeService: Send + Sync {
    /// Start a process instance at the definition's start event.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown definition key.
    fn start(
        &self,
        key: &str,
        business_key: Option<&str>,
        variables: &Variables,
    ) -> EngineResult<String>;

    /// Start a process instance positioned immediately before `activity_id`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown definition key or
    /// activity.
    fn start_before_activity(
        &self,
        key: &str,
        business_key: Option<&str>,
        activity_id: &str,
        variables: &Variables,
    ) -> EngineResult<String>;

    /// Start a process instance positioned immediately after `activity_id`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown definition key or
    /// activity.
    fn start_after_activity(
        &self,
        key: &str,
        business_key: Option<&str>,
        activity_id: &str,
        variables: &Variables,
    ) -> EngineResult<String>;

    /// List all active process instances.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn instances(&self) -> EngineResult<Vec<ProcessInstance>>;

    /// List active process instances of the definition with `key`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn instances_by_key(&self, key: &str) -> EngineResult<Vec<ProcessInstance>>;

    /// Delete an active process instance.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if no such instance is active.
    fn delete(&self, id: &str, reason: &str) -> EngineResult<()>;

    /// Read all variables visible in the scope (process instance) `scope_id`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if no such scope is active.
    fn variables(&self, scope_id: &str) -> EngineResult<Variables>;

    /// Write variables into the scope `scope_id`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if no such scope is active.
    fn set_variables(&self, scope_id: &str, variables: &Variables) -> EngineResult<()>;
}

/// Active user tasks.
pub trait TaskService: Send + Sync {
    /// List all active tasks.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn tasks(&self) -> EngineResult<Vec<Task>>;

    /// List active tasks whose definition key is `key`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn tasks_by_definition_key(&self, key: &str) -> EngineResult<Vec<Task>>;

    /// Look up an active task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn task(&self, id: &str) -> EngineResult<Option<Task>>;

    /// Complete an active task, merging `variables` into its process.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task and
    /// `EngineError::Rejected` when the completion violates a business rule.
    fn complete(&self, id: &str, variables: &Variables) -> EngineResult<()>;

    /// Read the task-local variables of an active task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task.
    fn local_variables(&self, id: &str) -> EngineResult<Variables>;

    /// Users assigned to the task (zero or one).
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task.
    fn assignees(&self, id: &str) -> EngineResult<Vec<String>>;

    /// Candidate users of the task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task.
    fn candidate_users(&self, id: &str) -> EngineResult<Vec<String>>;

    /// Candidate groups of the task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task.
    fn candidate_groups(&self, id: &str) -> EngineResult<Vec<String>>;

    /// Comments attached to the task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown task.
    fn comments(&self, id: &str) -> EngineResult<Vec<Comment>>;
}

/// Historic records. History outlives the runtime objects it describes.
pub trait HistoryService: Send + Sync {
    /// List every task the engine has created.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn historic_tasks(&self) -> EngineResult<Vec<HistoricTask>>;

    /// List historic tasks whose definition key is `key`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn historic_tasks_by_key(&self, key: &str) -> EngineResult<Vec<HistoricTask>>;

    /// Look up a historic task.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn historic_task(&self, id: &str) -> EngineResult<Option<HistoricTask>>;

    /// Activity instances of a process, ordered by start time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn activity_instances(&self, process_id: &str) -> EngineResult<Vec<ActivityInstance>>;

    /// Latest value of every variable a process has held.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the process never existed.
    fn historic_process_variables(&self, process_id: &str) -> EngineResult<Variables>;

    /// Every variable write of a process, in write order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the process never existed.
    fn variable_updates(&self, process_id: &str) -> EngineResult<Vec<VariableUpdate>>;

    /// Task-local variables of a task, active or ended.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if the task never existed.
    fn historic_task_variables(&self, task_id: &str) -> EngineResult<Variables>;
}

/// Message start events.
pub trait MessageCorrelator: Send + Sync {
    /// Start a process through the message start event `name`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if no definition declares the message.
    fn correlate_start_message(
        &self,
        name: &str,
        business_key: Option<&str>,
        variables: &Variables,
    ) -> EngineResult<String>;

    /// Start a process through `name` and report the correlation result.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` if no definition declares the message.
    fn correlate_start_message_with_result(
        &self,
        name: &str,
        variables: &Variables,
    ) -> EngineResult<CorrelationResult>;
}

/// The engine's asynchronous job queue.
pub trait JobExecutor: Send + Sync {
    /// Number of jobs that are due and waiting to be executed.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the engine cannot be queried.
    fn pending_count(&self) -> EngineResult<u64>;

    /// Execute every job that is currently due; returns how many ran.
    ///
    /// # Errors
    ///
    /// Returns the first error a job raised; jobs after it stay pending.
    fn execute_due(&self) -> EngineResult<u64>;
}

/// The simulated current time consulted by the engine's scheduler.
pub trait EngineClock: Send + Sync {
    /// The engine's current time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the clock cannot be read.
    fn now(&self) -> EngineResult<DateTime<Utc>>;

    /// Pin the engine's current time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the clock cannot be set.
    fn set_now(&self, time: DateTime<Utc>) -> EngineResult<()>;

    /// Return the engine to wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Unavailable` if the clock cannot be reset.
    fn reset(&self) -> EngineResult<()>;
}

/// Everything the scenario core needs from an engine.
pub trait EngineClient:
    DefinitionRepository
    + RuntimeService
    + TaskService
    + HistoryService
    + MessageCorrelator
    + JobExecutor
    + EngineClock
{
}

impl<T> EngineClient for T where
    T: DefinitionRepository
        + RuntimeService
        + TaskService
        + HistoryService
        + MessageCorrelator
        + JobExecutor
        + EngineClock
        + ?Sized
{
}
