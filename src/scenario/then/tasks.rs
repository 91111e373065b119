//! Active-task assertions and the property checks run against the focus
//! task.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;

use super::{Then, expect_count};
use crate::engine::{Task, TaskService};
use crate::error::ScenarioError;

/// Expected properties of a user task, checked together by
/// [`Then::with_task_properties`]. Unset properties are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTaskProperties {
    name: Option<String>,
    assignee: Option<String>,
    candidate_user: Option<String>,
    candidate_group: Option<String>,
    priority: Option<i32>,
    due_date: Option<DateTime<Utc>>,
    follow_up_date: Option<DateTime<Utc>>,
    description: Option<String>,
    comment: Option<String>,
}

impl UserTaskProperties {
    /// Expect the task name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Expect the assignee.
    #[must_use]
    pub fn assignee(mut self, user: impl Into<String>) -> Self {
        self.assignee = Some(user.into());
        self
    }

    /// Expect a candidate user.
    #[must_use]
    pub fn candidate_user(mut self, user: impl Into<String>) -> Self {
        self.candidate_user = Some(user.into());
        self
    }

    /// Expect a candidate group.
    #[must_use]
    pub fn candidate_group(mut self, group: impl Into<String>) -> Self {
        self.candidate_group = Some(group.into());
        self
    }

    /// Expect the priority.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Expect the due date.
    #[must_use]
    pub const fn due_date(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Expect the follow-up date.
    #[must_use]
    pub const fn follow_up_date(mut self, follow_up: DateTime<Utc>) -> Self {
        self.follow_up_date = Some(follow_up);
        self
    }

    /// Expect the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Expect a comment with this text.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

fn mismatch(
    task: &Task,
    property: &str,
    actual: impl std::fmt::Debug,
    expected: impl std::fmt::Debug,
) -> ScenarioError {
    ScenarioError::assertion(format!(
        "task '{}' has {property} {actual:?}, expected {expected:?}",
        task.definition_key
    ))
}

impl Then<'_> {
    fn tasks_of(&self, key: Option<&str>) -> Result<Vec<Task>, ScenarioError> {
        Ok(match key {
            Some(definition_key) => self.engine().tasks_by_definition_key(definition_key)?,
            None => self.engine().tasks()?,
        })
    }

    /// The active focus task.
    fn focus_task(&self) -> Result<Task, ScenarioError> {
        let task_id = self.state.require_task()?;
        self.engine().task(task_id)?.ok_or_else(|| {
            ScenarioError::assertion(format!("task '{task_id}' is no longer active"))
        })
    }

    /// Exactly `count` tasks are active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_tasks(self, count: usize) -> Result<Self, ScenarioError> {
        let tasks = self.tasks_of(None)?;
        expect_count("active task(s)", count, tasks.len())?;
        Ok(self)
    }

    /// Exactly `count` tasks of `key` are active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_tasks_of_type(self, count: usize, key: &str) -> Result<Self, ScenarioError> {
        let tasks = self.tasks_of(Some(key))?;
        expect_count(&format!("active '{key}' task(s)"), count, tasks.len())?;
        Ok(self)
    }

    /// Exactly `count` active tasks are named `name`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_tasks_with_name(self, count: usize, name: &str) -> Result<Self, ScenarioError> {
        let named = self
            .tasks_of(None)?
            .iter()
            .filter(|task| task.name == name)
            .count();
        expect_count(&format!("active task(s) named '{name}'"), count, named)?;
        Ok(self)
    }

    /// Exactly `count` active tasks of `key` have no assignee.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different count.
    pub fn active_not_assigned_tasks(self, count: usize, key: &str) -> Result<Self, ScenarioError> {
        let unassigned = self
            .tasks_of(Some(key))?
            .iter()
            .filter(|task| task.assignee.is_none())
            .count();
        expect_count(&format!("unassigned '{key}' task(s)"), count, unassigned)?;
        Ok(self)
    }

    /// No task is active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if any is.
    pub fn no_active_tasks(self) -> Result<Self, ScenarioError> {
        self.active_tasks(0)
    }

    /// No task of `key` is active.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if any is.
    pub fn no_active_tasks_of_type(self, key: &str) -> Result<Self, ScenarioError> {
        self.active_tasks_of_type(0, key)
    }

    /// Exactly one task of `key` is active; focus it.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` unless exactly one is.
    pub fn active_task(mut self, key: &str) -> Result<Self, ScenarioError> {
        let tasks = self.tasks_of(Some(key))?;
        let [task] = tasks.as_slice() else {
            return Err(ScenarioError::assertion(format!(
                "expected 1 active '{key}' task, found {}",
                tasks.len()
            )));
        };
        self.state.focus_task(&task.id);
        Ok(self)
    }

    /// Register the focus task under `name`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` without a focus task and
    /// `ScenarioError::AliasConflict` if `name` is taken.
    pub fn referenced_as(mut self, name: &str) -> Result<Self, ScenarioError> {
        self.state.register_task_alias(name)?;
        Ok(self)
    }

    /// Focus the task registered as `alias`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` for an unknown alias.
    pub fn task_referenced_as(mut self, alias: &str) -> Result<Self, ScenarioError> {
        let task_id = self.state.task_aliases().resolve(alias)?.to_owned();
        self.state.focus_task(&task_id);
        Ok(self)
    }

    // -- Focus task properties

    /// The focus task has local variable `name` set to `value`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a missing or different
    /// value.
    pub fn with_task_local_variable(
        self,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let expected = value.into();
        let locals = self.engine().local_variables(&task.id)?;
        let actual = locals.get(name);
        if actual != Some(&expected) {
            return Err(mismatch(&task, &format!("local variable '{name}'"), actual, &expected));
        }
        Ok(self)
    }

    /// The focus task is named `name`. An empty `name` skips the check.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different name.
    pub fn with_task_name(self, name: &str) -> Result<Self, ScenarioError> {
        if name.is_empty() {
            return Ok(self);
        }
        let task = self.focus_task()?;
        if task.name != name {
            return Err(mismatch(&task, "name", &task.name, name));
        }
        Ok(self)
    }

    /// The focus task is assigned to `user`. An empty `user` expects no
    /// assignee at all.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different assignee.
    pub fn with_assignee(self, user: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let assignees = self.engine().assignees(&task.id)?;
        let matches = if user.is_empty() {
            assignees.is_empty()
        } else {
            assignees.iter().any(|assignee| assignee == user)
        };
        if !matches {
            return Err(mismatch(&task, "assignees", &assignees, user));
        }
        Ok(self)
    }

    /// The focus task has no assignee.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it has one.
    pub fn no_assignee(self) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if let Some(assignee) = &task.assignee {
            return Err(mismatch(&task, "assignee", assignee, "none"));
        }
        Ok(self)
    }

    /// The focus task is not assigned to `user`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is.
    pub fn without_assignee(self, user: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.assignee.as_deref() == Some(user) {
            return Err(ScenarioError::assertion(format!(
                "task '{}' is unexpectedly assigned to '{user}'",
                task.definition_key
            )));
        }
        Ok(self)
    }

    /// Nobody is assigned to or a candidate for the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if anyone is.
    pub fn no_users_assigned(self) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let mut users = self.engine().assignees(&task.id)?;
        users.extend(self.engine().candidate_users(&task.id)?);
        if !users.is_empty() {
            return Err(mismatch(&task, "users", &users, "none"));
        }
        Ok(self)
    }

    /// `user` is a candidate user of the focus task. An empty `user`
    /// expects no candidate users at all.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is not.
    pub fn with_candidate_user(self, user: &str) -> Result<Self, ScenarioError> {
        if user.is_empty() {
            return self.no_candidate_users();
        }
        self.with_candidate_users(&[user])
    }

    /// Every user in `users` is a candidate user of the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` for the first missing user.
    pub fn with_candidate_users(self, users: &[&str]) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_users(&task.id)?;
        if let Some(missing) = users
            .iter()
            .find(|user| !candidates.iter().any(|candidate| candidate == **user))
        {
            return Err(mismatch(&task, "candidate users", &candidates, missing));
        }
        Ok(self)
    }

    /// `user` is not a candidate user of the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is.
    pub fn no_candidate_user(self, user: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_users(&task.id)?;
        if candidates.iter().any(|candidate| candidate == user) {
            return Err(ScenarioError::assertion(format!(
                "task '{}' unexpectedly has candidate user '{user}'",
                task.definition_key
            )));
        }
        Ok(self)
    }

    /// The focus task has no candidate users.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it has any.
    pub fn no_candidate_users(self) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_users(&task.id)?;
        if !candidates.is_empty() {
            return Err(mismatch(&task, "candidate users", &candidates, "none"));
        }
        Ok(self)
    }

    /// `group` is a candidate group of the focus task. An empty `group`
    /// expects no candidate groups at all.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is not.
    pub fn with_candidate_group(self, group: &str) -> Result<Self, ScenarioError> {
        if group.is_empty() {
            return self.no_candidate_groups();
        }
        self.with_candidate_groups(&[group])
    }

    /// Every group in `groups` is a candidate group of the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` for the first missing group.
    pub fn with_candidate_groups(self, groups: &[&str]) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_groups(&task.id)?;
        if let Some(missing) = groups
            .iter()
            .find(|group| !candidates.iter().any(|candidate| candidate == **group))
        {
            return Err(mismatch(&task, "candidate groups", &candidates, missing));
        }
        Ok(self)
    }

    /// `group` is not a candidate group of the focus task.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it is.
    pub fn no_candidate_group(self, group: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_groups(&task.id)?;
        if candidates.iter().any(|candidate| candidate == group) {
            return Err(ScenarioError::assertion(format!(
                "task '{}' unexpectedly has candidate group '{group}'",
                task.definition_key
            )));
        }
        Ok(self)
    }

    /// The focus task has no candidate groups.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if it has any.
    pub fn no_candidate_groups(self) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let candidates = self.engine().candidate_groups(&task.id)?;
        if !candidates.is_empty() {
            return Err(mismatch(&task, "candidate groups", &candidates, "none"));
        }
        Ok(self)
    }

    /// The focus task has form key `form_key`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different form key.
    pub fn with_form_key(self, form_key: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.form_key.as_deref() != Some(form_key) {
            return Err(mismatch(&task, "form key", &task.form_key, form_key));
        }
        Ok(self)
    }

    /// The focus task has priority `priority`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different priority.
    pub fn with_priority(self, priority: i32) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.priority != priority {
            return Err(mismatch(&task, "priority", task.priority, priority));
        }
        Ok(self)
    }

    /// The focus task is due at `due`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different due date.
    pub fn with_due_date(self, due: DateTime<Utc>) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.due_date != Some(due) {
            return Err(mismatch(&task, "due date", task.due_date, due));
        }
        Ok(self)
    }

    /// The focus task is due `delta` after it was created.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different due date.
    pub fn with_due_date_in_future(self, delta: TimeDelta) -> Result<Self, ScenarioError> {
        let created = self.focus_task()?.create_time;
        self.with_due_date_in_future_from(delta, created)
    }

    /// The focus task is due `delta` after `from`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different due date.
    pub fn with_due_date_in_future_from(
        self,
        delta: TimeDelta,
        from: DateTime<Utc>,
    ) -> Result<Self, ScenarioError> {
        let due = from.checked_add_signed(delta).ok_or_else(|| {
            ScenarioError::invalid_state(format!("{from} + {delta} is out of range"))
        })?;
        self.with_due_date(due)
    }

    /// The focus task has follow-up date `follow_up`. `None` expects no
    /// follow-up date.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different date.
    pub fn with_follow_up_date(
        self,
        follow_up: Option<DateTime<Utc>>,
    ) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.follow_up_date != follow_up {
            return Err(mismatch(&task, "follow-up date", task.follow_up_date, follow_up));
        }
        Ok(self)
    }

    /// The focus task has description `description`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` on a different description.
    pub fn with_description(self, description: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        if task.description.as_deref() != Some(description) {
            return Err(mismatch(&task, "description", &task.description, description));
        }
        Ok(self)
    }

    /// The focus task carries a comment with exactly `comment` as text.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` if no comment matches.
    pub fn with_comment(self, comment: &str) -> Result<Self, ScenarioError> {
        let task = self.focus_task()?;
        let comments = self.engine().comments(&task.id)?;
        if !comments.iter().any(|existing| existing.message == comment) {
            let messages: Vec<&str> = comments.iter().map(|c| c.message.as_str()).collect();
            return Err(mismatch(&task, "comments", messages, comment));
        }
        Ok(self)
    }

    /// The focus task has every property set in `expected`.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AssertionFailure` for the first mismatch.
    pub fn with_task_properties(self, expected: &UserTaskProperties) -> Result<Self, ScenarioError> {
        let mut stage = self;
        if let Some(name) = &expected.name {
            stage = stage.with_task_name(name)?;
        }
        if let Some(assignee) = &expected.assignee {
            stage = stage.with_assignee(assignee)?;
        }
        if let Some(user) = &expected.candidate_user {
            stage = stage.with_candidate_user(user)?;
        }
        if let Some(group) = &expected.candidate_group {
            stage = stage.with_candidate_group(group)?;
        }
        if let Some(priority) = expected.priority {
            stage = stage.with_priority(priority)?;
        }
        if let Some(due) = expected.due_date {
            stage = stage.with_due_date(due)?;
        }
        if let Some(follow_up) = expected.follow_up_date {
            stage = stage.with_follow_up_date(Some(follow_up))?;
        }
        if let Some(description) = &expected.description {
            stage = stage.with_description(description)?;
        }
        if let Some(comment) = &expected.comment {
            stage = stage.with_comment(comment)?;
        }
        Ok(stage)
    }
}
