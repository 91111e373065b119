//! Mutable state of the in-memory engine and the execution rules that
//! move process instances through their models.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use super::model::{Activity, ActivityKind, END_EVENT_ID, ProcessModel, START_EVENT_ID, UserTaskSpec};
use crate::engine::{
    ActivityInstance, ActivityType, Comment, HistoricTask, ProcessDefinition, ProcessInstance,
    Task, VariableUpdate, Variables,
};
use crate::error::{EngineError, EngineObject};

/// Where a new process instance begins executing.
#[derive(Debug, Clone, Copy)]
pub(super) enum Entry<'a> {
    /// At the start event.
    Start,
    /// Immediately before the named activity.
    Before(&'a str),
    /// Immediately after the named activity.
    After(&'a str),
}

struct Deployed {
    definition: ProcessDefinition,
    model: Arc<ProcessModel>,
}

struct Instance {
    info: ProcessInstance,
    model: Arc<ProcessModel>,
    variables: Variables,
}

struct RuntimeTask {
    task: Task,
    position: usize,
    candidate_users: Vec<String>,
    candidate_groups: Vec<String>,
    local_variables: Variables,
    required_variables: Vec<String>,
}

struct HistoricTaskRecord {
    task: HistoricTask,
    local_variables: Variables,
}

#[derive(Default)]
struct ProcessHistory {
    variables: Variables,
    updates: Vec<VariableUpdate>,
}

struct Job {
    id: u64,
    process_instance_id: String,
    position: usize,
    due: DateTime<Utc>,
}

/// Everything the in-memory engine stores. Collections keep insertion
/// order so listings are deterministic.
#[derive(Default)]
pub(super) struct EngineState {
    definitions: Vec<Deployed>,
    instances: Vec<Instance>,
    tasks: Vec<RuntimeTask>,
    historic_tasks: Vec<HistoricTaskRecord>,
    activities: Vec<ActivityInstance>,
    process_history: Vec<(String, ProcessHistory)>,
    jobs: Vec<Job>,
    comments: Vec<Comment>,
    pinned_time: Option<DateTime<Utc>>,
    sequence: u64,
}

fn not_found(kind: EngineObject, id: &str) -> EngineError {
    EngineError::NotFound {
        kind,
        id: id.to_owned(),
    }
}

fn checked_offset(from: DateTime<Utc>, delta: TimeDelta) -> Result<DateTime<Utc>, EngineError> {
    from.checked_add_signed(delta)
        .ok_or_else(|| EngineError::Rejected {
            operation: String::from("schedule"),
            message: format!("{from} + {delta} is out of range"),
        })
}

impl EngineState {
    // -- Clock

    pub(super) fn now(&self) -> DateTime<Utc> {
        self.pinned_time.unwrap_or_else(Utc::now)
    }

    pub(super) const fn pin_time(&mut self, time: Option<DateTime<Utc>>) {
        self.pinned_time = time;
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    // -- Definitions

    pub(super) fn deploy(&mut self, model: ProcessModel) -> ProcessDefinition {
        let version = self
            .definitions
            .iter()
            .find(|deployed| deployed.definition.key == model.key)
            .map_or(1, |deployed| deployed.definition.version + 1);
        self.sequence += 1;
        let definition = ProcessDefinition {
            id: format!("{}:{version}:{}", model.key, self.sequence),
            key: model.key.clone(),
            name: model.name.clone(),
            version,
        };
        self.definitions
            .retain(|deployed| deployed.definition.key != model.key);
        self.definitions.push(Deployed {
            definition: definition.clone(),
            model: Arc::new(model),
        });
        definition
    }

    pub(super) fn definitions(&self) -> Vec<ProcessDefinition> {
        self.definitions
            .iter()
            .map(|deployed| deployed.definition.clone())
            .collect()
    }

    pub(super) fn definition(&self, key: &str) -> Option<ProcessDefinition> {
        self.definitions
            .iter()
            .find(|deployed| deployed.definition.key == key)
            .map(|deployed| deployed.definition.clone())
    }

    pub(super) fn definition_for_message(&self, message: &str) -> Option<String> {
        self.definitions
            .iter()
            .find(|deployed| deployed.model.message_start.as_deref() == Some(message))
            .map(|deployed| deployed.definition.key.clone())
    }

    // -- Instances

    pub(super) fn start(
        &mut self,
        key: &str,
        business_key: Option<&str>,
        variables: &Variables,
        entry: Entry<'_>,
    ) -> Result<String, EngineError> {
        let model = self
            .definitions
            .iter()
            .find(|deployed| deployed.definition.key == key)
            .map(|deployed| Arc::clone(&deployed.model))
            .ok_or_else(|| not_found(EngineObject::Definition, key))?;

        let position = match entry {
            Entry::Start => 0,
            Entry::Before(activity) => model
                .position_of(activity)
                .ok_or_else(|| not_found(EngineObject::Activity, activity))?,
            Entry::After(activity) => {
                model
                    .position_of(activity)
                    .ok_or_else(|| not_found(EngineObject::Activity, activity))?
                    + 1
            }
        };

        let id = self.next_id("process");
        self.instances.push(Instance {
            info: ProcessInstance {
                id: id.clone(),
                definition_key: key.to_owned(),
                business_key: business_key.map(str::to_owned),
            },
            model,
            variables: Variables::new(),
        });
        self.process_history
            .push((id.clone(), ProcessHistory::default()));
        self.write_variables(&id, variables)?;

        if matches!(entry, Entry::Start) {
            let now = self.now();
            self.activities.push(ActivityInstance {
                process_instance_id: id.clone(),
                activity_id: START_EVENT_ID.to_owned(),
                activity_name: None,
                activity_type: ActivityType::StartEvent,
                start_time: now,
                end_time: Some(now),
            });
        }

        self.run_from(&id, position)?;
        Ok(id)
    }

    pub(super) fn instances(&self) -> Vec<ProcessInstance> {
        self.instances
            .iter()
            .map(|instance| instance.info.clone())
            .collect()
    }

    fn instance(&self, id: &str) -> Result<&Instance, EngineError> {
        self.instances
            .iter()
            .find(|instance| instance.info.id == id)
            .ok_or_else(|| not_found(EngineObject::Process, id))
    }

    pub(super) fn variables(&self, process_id: &str) -> Result<Variables, EngineError> {
        self.instance(process_id)
            .map(|instance| instance.variables.clone())
    }

    pub(super) fn write_variables(
        &mut self,
        process_id: &str,
        variables: &Variables,
    ) -> Result<(), EngineError> {
        let now = self.now();
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| instance.info.id == process_id)
            .ok_or_else(|| not_found(EngineObject::Process, process_id))?;
        instance
            .variables
            .extend(variables.iter().map(|(name, value)| (name.clone(), value.clone())));

        if let Some((_, history)) = self
            .process_history
            .iter_mut()
            .find(|(id, _)| id == process_id)
        {
            for (name, value) in variables {
                history.variables.insert(name.clone(), value.clone());
                history.updates.push(VariableUpdate {
                    name: name.clone(),
                    value: value.clone(),
                    time: now,
                });
            }
        }
        Ok(())
    }

    pub(super) fn delete(&mut self, process_id: &str, reason: &str) -> Result<(), EngineError> {
        self.instance(process_id)?;
        let now = self.now();

        let task_ids: Vec<String> = self
            .tasks
            .iter()
            .filter(|runtime| runtime.task.process_instance_id == process_id)
            .map(|runtime| runtime.task.id.clone())
            .collect();
        for task_id in &task_ids {
            self.end_task(task_id, reason, now);
        }

        for activity in self
            .activities
            .iter_mut()
            .filter(|activity| activity.process_instance_id == process_id)
        {
            activity.end_time.get_or_insert(now);
        }
        self.jobs
            .retain(|job| job.process_instance_id != process_id);
        self.instances
            .retain(|instance| instance.info.id != process_id);
        Ok(())
    }

    // -- Execution

    fn run_from(&mut self, process_id: &str, start: usize) -> Result<(), EngineError> {
        let model = Arc::clone(&self.instance(process_id)?.model);
        let mut position = start;
        loop {
            let Some(activity) = model.activities.get(position) else {
                self.finish(process_id);
                return Ok(());
            };
            let now = self.now();
            self.enter_activity(process_id, activity, now);
            match &activity.kind {
                ActivityKind::UserTask(spec) => {
                    self.create_task(process_id, activity, position, spec, now);
                    return Ok(());
                }
                ActivityKind::Timer { duration } => {
                    let due = checked_offset(now, *duration)?;
                    self.schedule_job(process_id, position, due);
                    return Ok(());
                }
                ActivityKind::ServiceTask {
                    asynchronous: true,
                    ..
                } => {
                    self.schedule_job(process_id, position, now);
                    return Ok(());
                }
                ActivityKind::ServiceTask {
                    writes,
                    asynchronous: false,
                } => {
                    self.write_variables(process_id, writes)?;
                    self.leave_activity(process_id, &activity.id, now);
                    position += 1;
                }
            }
        }
    }

    /// Resume a process waiting at `position` once its wait state is over.
    fn resume(&mut self, process_id: &str, position: usize) -> Result<(), EngineError> {
        let model = Arc::clone(&self.instance(process_id)?.model);
        let Some(activity) = model.activities.get(position) else {
            return Err(not_found(EngineObject::Activity, &position.to_string()));
        };
        if let ActivityKind::ServiceTask { writes, .. } = &activity.kind {
            self.write_variables(process_id, writes)?;
        }
        let now = self.now();
        self.leave_activity(process_id, &activity.id, now);
        self.run_from(process_id, position + 1)
    }

    fn enter_activity(&mut self, process_id: &str, activity: &Activity, now: DateTime<Utc>) {
        self.activities.push(ActivityInstance {
            process_instance_id: process_id.to_owned(),
            activity_id: activity.id.clone(),
            activity_name: activity.name().map(str::to_owned),
            activity_type: activity.kind.activity_type(),
            start_time: now,
            end_time: None,
        });
    }

    fn leave_activity(&mut self, process_id: &str, activity_id: &str, now: DateTime<Utc>) {
        if let Some(open) = self.activities.iter_mut().rev().find(|activity| {
            activity.process_instance_id == process_id
                && activity.activity_id == activity_id
                && activity.end_time.is_none()
        }) {
            open.end_time = Some(now);
        }
    }

    fn finish(&mut self, process_id: &str) {
        let now = self.now();
        self.activities.push(ActivityInstance {
            process_instance_id: process_id.to_owned(),
            activity_id: END_EVENT_ID.to_owned(),
            activity_name: None,
            activity_type: ActivityType::EndEvent,
            start_time: now,
            end_time: Some(now),
        });
        self.jobs
            .retain(|job| job.process_instance_id != process_id);
        self.instances
            .retain(|instance| instance.info.id != process_id);
    }

    // -- Tasks

    fn create_task(
        &mut self,
        process_id: &str,
        activity: &Activity,
        position: usize,
        spec: &UserTaskSpec,
        now: DateTime<Utc>,
    ) {
        let id = self.next_id("task");
        let task = Task {
            id: id.clone(),
            name: spec.name.clone(),
            definition_key: activity.id.clone(),
            process_instance_id: process_id.to_owned(),
            assignee: spec.assignee.clone(),
            priority: spec.priority,
            form_key: spec.form_key.clone(),
            description: spec.description.clone(),
            create_time: now,
            due_date: spec.due_in.and_then(|delta| now.checked_add_signed(delta)),
            follow_up_date: spec
                .follow_up_in
                .and_then(|delta| now.checked_add_signed(delta)),
        };
        self.historic_tasks.push(HistoricTaskRecord {
            task: HistoricTask {
                id,
                name: task.name.clone(),
                definition_key: task.definition_key.clone(),
                process_instance_id: task.process_instance_id.clone(),
                assignee: task.assignee.clone(),
                start_time: now,
                end_time: None,
                delete_reason: None,
            },
            local_variables: spec.local_variables.clone(),
        });
        self.tasks.push(RuntimeTask {
            task,
            position,
            candidate_users: spec.candidate_users.clone(),
            candidate_groups: spec.candidate_groups.clone(),
            local_variables: spec.local_variables.clone(),
            required_variables: spec.required_variables.clone(),
        });
    }

    fn runtime_task(&self, id: &str) -> Result<&RuntimeTask, EngineError> {
        self.tasks
            .iter()
            .find(|runtime| runtime.task.id == id)
            .ok_or_else(|| not_found(EngineObject::Task, id))
    }

    pub(super) fn tasks(&self) -> Vec<Task> {
        self.tasks.iter().map(|runtime| runtime.task.clone()).collect()
    }

    pub(super) fn task(&self, id: &str) -> Option<Task> {
        self.runtime_task(id).ok().map(|runtime| runtime.task.clone())
    }

    pub(super) fn local_variables(&self, id: &str) -> Result<Variables, EngineError> {
        self.runtime_task(id)
            .map(|runtime| runtime.local_variables.clone())
    }

    pub(super) fn assignees(&self, id: &str) -> Result<Vec<String>, EngineError> {
        self.runtime_task(id)
            .map(|runtime| runtime.task.assignee.iter().cloned().collect())
    }

    pub(super) fn candidate_users(&self, id: &str) -> Result<Vec<String>, EngineError> {
        self.runtime_task(id)
            .map(|runtime| runtime.candidate_users.clone())
    }

    pub(super) fn candidate_groups(&self, id: &str) -> Result<Vec<String>, EngineError> {
        self.runtime_task(id)
            .map(|runtime| runtime.candidate_groups.clone())
    }

    pub(super) fn complete(&mut self, id: &str, variables: &Variables) -> Result<(), EngineError> {
        let runtime = self.runtime_task(id)?;
        let process_id = runtime.task.process_instance_id.clone();
        let definition_key = runtime.task.definition_key.clone();
        let position = runtime.position;
        let process_variables = &self.instance(&process_id)?.variables;

        if let Some(missing) = runtime.required_variables.iter().find(|name| {
            variables
                .get(name.as_str())
                .or_else(|| process_variables.get(name.as_str()))
                .is_none_or(serde_json::Value::is_null)
        }) {
            return Err(EngineError::Rejected {
                operation: format!("complete task '{id}'"),
                message: format!("variable '{missing}' is required"),
            });
        }

        self.write_variables(&process_id, variables)?;
        let now = self.now();
        self.end_task(id, "completed", now);
        self.leave_activity(&process_id, &definition_key, now);
        self.run_from(&process_id, position + 1)
    }

    fn end_task(&mut self, id: &str, reason: &str, now: DateTime<Utc>) {
        self.tasks.retain(|runtime| runtime.task.id != id);
        if let Some(record) = self
            .historic_tasks
            .iter_mut()
            .find(|record| record.task.id == id)
        {
            record.task.end_time = Some(now);
            record.task.delete_reason = Some(reason.to_owned());
        }
    }

    pub(super) fn add_comment(&mut self, task_id: &str, message: &str) -> Result<Comment, EngineError> {
        self.runtime_task(task_id)?;
        let now = self.now();
        let comment = Comment {
            id: self.next_id("comment"),
            task_id: task_id.to_owned(),
            message: message.to_owned(),
            time: now,
        };
        self.comments.push(comment.clone());
        Ok(comment)
    }

    pub(super) fn comments(&self, task_id: &str) -> Result<Vec<Comment>, EngineError> {
        if !self
            .historic_tasks
            .iter()
            .any(|record| record.task.id == task_id)
        {
            return Err(not_found(EngineObject::Task, task_id));
        }
        Ok(self
            .comments
            .iter()
            .filter(|comment| comment.task_id == task_id)
            .cloned()
            .collect())
    }

    // -- History

    pub(super) fn historic_tasks(&self) -> Vec<HistoricTask> {
        self.historic_tasks
            .iter()
            .map(|record| record.task.clone())
            .collect()
    }

    pub(super) fn historic_task_variables(&self, task_id: &str) -> Result<Variables, EngineError> {
        self.historic_tasks
            .iter()
            .find(|record| record.task.id == task_id)
            .map(|record| record.local_variables.clone())
            .ok_or_else(|| not_found(EngineObject::Task, task_id))
    }

    pub(super) fn activity_instances(&self, process_id: &str) -> Vec<ActivityInstance> {
        let mut activities: Vec<ActivityInstance> = self
            .activities
            .iter()
            .filter(|activity| activity.process_instance_id == process_id)
            .cloned()
            .collect();
        // Stable: activities entered at the same instant keep entry order.
        activities.sort_by_key(|activity| activity.start_time);
        activities
    }

    fn process_history(&self, process_id: &str) -> Result<&ProcessHistory, EngineError> {
        self.process_history
            .iter()
            .find(|(id, _)| id == process_id)
            .map(|(_, history)| history)
            .ok_or_else(|| not_found(EngineObject::Process, process_id))
    }

    pub(super) fn historic_process_variables(
        &self,
        process_id: &str,
    ) -> Result<Variables, EngineError> {
        self.process_history(process_id)
            .map(|history| history.variables.clone())
    }

    pub(super) fn variable_updates(
        &self,
        process_id: &str,
    ) -> Result<Vec<VariableUpdate>, EngineError> {
        self.process_history(process_id)
            .map(|history| history.updates.clone())
    }

    // -- Jobs

    fn schedule_job(&mut self, process_id: &str, position: usize, due: DateTime<Utc>) {
        self.sequence += 1;
        self.jobs.push(Job {
            id: self.sequence,
            process_instance_id: process_id.to_owned(),
            position,
            due,
        });
    }

    pub(super) fn pending_count(&self) -> u64 {
        let now = self.now();
        let due = self.jobs.iter().filter(|job| job.due <= now).count();
        u64::try_from(due).unwrap_or(u64::MAX)
    }

    pub(super) fn execute_due(&mut self) -> Result<u64, EngineError> {
        let now = self.now();
        let mut due: Vec<(DateTime<Utc>, u64)> = self
            .jobs
            .iter()
            .filter(|job| job.due <= now)
            .map(|job| (job.due, job.id))
            .collect();
        due.sort_unstable();

        let mut executed = 0_u64;
        for (_, job_id) in due {
            let Some(index) = self.jobs.iter().position(|job| job.id == job_id) else {
                continue;
            };
            let job = self.jobs.remove(index);
            self.resume(&job.process_instance_id, job.position)?;
            executed += 1;
        }
        Ok(executed)
    }
}
