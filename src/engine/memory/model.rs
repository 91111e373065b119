//! Sequential process models understood by the in-memory engine.
//!
//! A model is a start event, an ordered list of activities, and an end
//! event. Execution walks the list front to back, waiting at user tasks,
//! timers, and asynchronous service tasks.

use chrono::TimeDelta;
use serde_json::Value;

use crate::engine::{ActivityType, Variables};

/// Activity id recorded for the start event of every model.
pub const START_EVENT_ID: &str = "StartEvent";

/// Activity id recorded for the end event of every model.
pub const END_EVENT_ID: &str = "EndEvent";

/// A user task and the properties its runtime task is created with.
#[derive(Debug, Clone, Default)]
pub struct UserTaskSpec {
    pub(crate) name: String,
    pub(crate) assignee: Option<String>,
    pub(crate) candidate_users: Vec<String>,
    pub(crate) candidate_groups: Vec<String>,
    pub(crate) priority: i32,
    pub(crate) form_key: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) due_in: Option<TimeDelta>,
    pub(crate) follow_up_in: Option<TimeDelta>,
    pub(crate) local_variables: Variables,
    pub(crate) required_variables: Vec<String>,
}

impl UserTaskSpec {
    /// A user task with the given display name and default priority 50.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 50,
            ..Self::default()
        }
    }

    /// Assign the task to `user` on creation.
    #[must_use]
    pub fn assignee(mut self, user: impl Into<String>) -> Self {
        self.assignee = Some(user.into());
        self
    }

    /// Add a candidate user.
    #[must_use]
    pub fn candidate_user(mut self, user: impl Into<String>) -> Self {
        self.candidate_users.push(user.into());
        self
    }

    /// Add a candidate group.
    #[must_use]
    pub fn candidate_group(mut self, group: impl Into<String>) -> Self {
        self.candidate_groups.push(group.into());
        self
    }

    /// Set the task priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the form key.
    #[must_use]
    pub fn form_key(mut self, form_key: impl Into<String>) -> Self {
        self.form_key = Some(form_key.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Due `delta` after the task is created.
    #[must_use]
    pub const fn due_in(mut self, delta: TimeDelta) -> Self {
        self.due_in = Some(delta);
        self
    }

    /// Follow up `delta` after the task is created.
    #[must_use]
    pub const fn follow_up_in(mut self, delta: TimeDelta) -> Self {
        self.follow_up_in = Some(delta);
        self
    }

    /// Create the task with a task-local variable.
    #[must_use]
    pub fn local_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.local_variables.insert(name.into(), value);
        self
    }

    /// Reject completion unless `variable` holds a non-null value once the
    /// completion variables are merged into the process variables.
    #[must_use]
    pub fn requires(mut self, variable: impl Into<String>) -> Self {
        self.required_variables.push(variable.into());
        self
    }
}

/// What an activity does when execution reaches it.
#[derive(Debug, Clone)]
pub enum ActivityKind {
    /// Wait for a user task to be completed.
    UserTask(UserTaskSpec),
    /// Wait until the engine clock has moved `duration` past arrival.
    Timer {
        /// How long the timer waits.
        duration: TimeDelta,
    },
    /// Write variables, optionally behind an asynchronous continuation.
    ServiceTask {
        /// Variables written when the task runs.
        writes: Variables,
        /// Whether execution waits for the job executor before running.
        asynchronous: bool,
    },
}

impl ActivityKind {
    pub(crate) const fn activity_type(&self) -> ActivityType {
        match self {
            Self::UserTask(_) => ActivityType::UserTask,
            Self::Timer { .. } => ActivityType::Timer,
            Self::ServiceTask { .. } => ActivityType::ServiceTask,
        }
    }
}

/// One step of a sequential model.
#[derive(Debug, Clone)]
pub struct Activity {
    /// Activity id, unique within the model.
    pub id: String,
    /// What the activity does.
    pub kind: ActivityKind,
}

impl Activity {
    /// The activity's display name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ActivityKind::UserTask(spec) => Some(spec.name.as_str()),
            ActivityKind::Timer { .. } | ActivityKind::ServiceTask { .. } => None,
        }
    }
}

/// A deployable sequential process model.
///
/// ```
/// use chrono::TimeDelta;
/// use procspec::engine::memory::{ProcessModel, UserTaskSpec};
///
/// let model = ProcessModel::new("TestProcess")
///     .named("Test Process")
///     .message_start("TestProcess")
///     .user_task("UserTask_ReviewResults", UserTaskSpec::named("Review Results"))
///     .timer("Timer_Cooldown", TimeDelta::hours(1));
/// assert_eq!(model.key(), "TestProcess");
/// ```
#[derive(Debug, Clone)]
pub struct ProcessModel {
    pub(crate) key: String,
    pub(crate) name: Option<String>,
    pub(crate) message_start: Option<String>,
    pub(crate) activities: Vec<Activity>,
}

impl ProcessModel {
    /// An empty model (start event straight to end event) with `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            message_start: None,
            activities: Vec::new(),
        }
    }

    /// The definition key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Give the definition a display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Let the message `message` start this process.
    #[must_use]
    pub fn message_start(mut self, message: impl Into<String>) -> Self {
        self.message_start = Some(message.into());
        self
    }

    /// Append a user task.
    #[must_use]
    pub fn user_task(mut self, id: impl Into<String>, spec: UserTaskSpec) -> Self {
        self.activities.push(Activity {
            id: id.into(),
            kind: ActivityKind::UserTask(spec),
        });
        self
    }

    /// Append an intermediate timer.
    #[must_use]
    pub fn timer(mut self, id: impl Into<String>, duration: TimeDelta) -> Self {
        self.activities.push(Activity {
            id: id.into(),
            kind: ActivityKind::Timer { duration },
        });
        self
    }

    /// Append a synchronous service task writing `writes`.
    #[must_use]
    pub fn service_task(mut self, id: impl Into<String>, writes: Variables) -> Self {
        self.activities.push(Activity {
            id: id.into(),
            kind: ActivityKind::ServiceTask {
                writes,
                asynchronous: false,
            },
        });
        self
    }

    /// Append a service task behind an asynchronous continuation.
    #[must_use]
    pub fn async_service_task(mut self, id: impl Into<String>, writes: Variables) -> Self {
        self.activities.push(Activity {
            id: id.into(),
            kind: ActivityKind::ServiceTask {
                writes,
                asynchronous: true,
            },
        });
        self
    }

    /// Index of the activity with `id`.
    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.activities.iter().position(|activity| activity.id == id)
    }
}
