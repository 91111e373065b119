//! Data types exchanged with an engine client.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A variable payload: variable name to JSON value.
///
/// `Value::Null` is treated as an "empty" value by the assertion helpers.
pub type Variables = BTreeMap<String, Value>;

/// A deployed process definition (latest version per key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    /// Engine-assigned identifier, unique per deployed version.
    pub id: String,
    /// The definition key processes are started by.
    pub key: String,
    /// Human-readable name, if the model declares one.
    pub name: Option<String>,
    /// Deployment version, starting at 1.
    pub version: u32,
}

/// An active process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstance {
    /// Engine-assigned identifier.
    pub id: String,
    /// Key of the definition the instance was started from.
    pub definition_key: String,
    /// Business key supplied at start, if any.
    pub business_key: Option<String>,
}

/// An active user task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Engine-assigned identifier.
    pub id: String,
    /// Display name of the task.
    pub name: String,
    /// Activity id of the task in its process definition.
    pub definition_key: String,
    /// The process instance the task belongs to.
    pub process_instance_id: String,
    /// The assigned user, if any.
    pub assignee: Option<String>,
    /// Task priority.
    pub priority: i32,
    /// Form key used by task list applications.
    pub form_key: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// When the task was created, in engine time.
    pub create_time: DateTime<Utc>,
    /// Due date, if the model declares one.
    pub due_date: Option<DateTime<Utc>>,
    /// Follow-up date, if the model declares one.
    pub follow_up_date: Option<DateTime<Utc>>,
}

/// A user task as recorded in history, whether active, completed, or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricTask {
    /// Engine-assigned identifier, shared with the runtime [`Task`].
    pub id: String,
    /// Display name of the task.
    pub name: String,
    /// Activity id of the task in its process definition.
    pub definition_key: String,
    /// The process instance the task belonged to.
    pub process_instance_id: String,
    /// The user assigned when the task ended.
    pub assignee: Option<String>,
    /// When the task was created.
    pub start_time: DateTime<Utc>,
    /// When the task ended; `None` while it is still active.
    pub end_time: Option<DateTime<Utc>>,
    /// Why the task ended (`completed` or the deletion reason).
    pub delete_reason: Option<String>,
}

impl HistoricTask {
    /// Whether the task has ended.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }
}

/// The kind of an activity instance recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    /// A (none or message) start event.
    StartEvent,
    /// A user task.
    UserTask,
    /// An intermediate timer catch event.
    Timer,
    /// A service task.
    ServiceTask,
    /// The end event.
    EndEvent,
}

/// One execution of an activity within a process instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityInstance {
    /// The process instance the activity ran in.
    pub process_instance_id: String,
    /// Activity id from the process definition.
    pub activity_id: String,
    /// Activity name from the process definition, if any.
    pub activity_name: Option<String>,
    /// The activity kind.
    pub activity_type: ActivityType,
    /// When the activity was entered.
    pub start_time: DateTime<Utc>,
    /// When the activity was left; `None` while waiting in it.
    pub end_time: Option<DateTime<Utc>>,
}

impl ActivityInstance {
    /// Whether `reference` names this activity, by id or by name.
    #[must_use]
    pub fn matches(&self, reference: &str) -> bool {
        self.activity_id == reference || self.activity_name.as_deref() == Some(reference)
    }
}

/// One recorded write of a process variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableUpdate {
    /// Variable name.
    pub name: String,
    /// Value written.
    pub value: Value,
    /// Engine time of the write.
    pub time: DateTime<Utc>,
}

/// A comment attached to a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Engine-assigned identifier.
    pub id: String,
    /// The task the comment belongs to.
    pub task_id: String,
    /// The full comment text.
    pub message: String,
    /// When the comment was written.
    pub time: DateTime<Utc>,
}

/// Outcome of correlating a start message "with result".
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationResult {
    /// The process instance the message started.
    pub process_instance_id: String,
    /// Key of the started process definition.
    pub definition_key: String,
    /// Business key of the started instance, if any.
    pub business_key: Option<String>,
    /// Process variables right after the start completed.
    pub variables: Variables,
}
