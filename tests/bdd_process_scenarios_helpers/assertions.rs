//! Assertion steps for process scenarios.

use procspec::engine::{DefinitionRepository, TaskService};
use rstest_bdd_macros::then;

use super::StepResult;
use super::state::ProcessState;

#[then("{count} process of type {key} is active")]
fn processes_of_type_active(
    process_state: &ProcessState,
    count: usize,
    key: String,
) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().active_processes_of_type(count, &key)?;
        Ok(())
    })
}

#[then("no process is active")]
fn no_process_active(process_state: &ProcessState) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().no_active_processes()?;
        Ok(())
    })
}

#[then("the active task {key} is named {name}")]
fn active_task_named(process_state: &ProcessState, key: String, name: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().active_task(&key)?.with_task_name(&name)?;
        Ok(())
    })
}

#[then("the process runtime has {name} set to {value}")]
fn runtime_has_value(process_state: &ProcessState, name: String, value: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().process_runtime()?.contains(&name, value)?;
        Ok(())
    })
}

#[then("{count} task has been completed")]
fn tasks_completed(process_state: &ProcessState, count: usize) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().completed_tasks(count)?;
        Ok(())
    })
}

#[then("the completed task {key} is named {name}")]
fn completed_task_named(process_state: &ProcessState, key: String, name: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario
            .then()
            .completed_task(&key)?
            .with_completed_task_name(&name)?;
        Ok(())
    })
}

#[then("{count} tasks of type {key} are active")]
fn tasks_of_type_active(process_state: &ProcessState, count: usize, key: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.then().active_tasks_of_type(count, &key)?;
        Ok(())
    })
}

#[then("the only deployed definition is {key}")]
fn only_deployed_definition(process_state: &ProcessState, key: String) -> StepResult<()> {
    let definitions = process_state
        .engine()?
        .list_definitions()
        .map_err(|e| e.to_string())?;
    let keys: Vec<&str> = definitions.iter().map(|d| d.key.as_str()).collect();
    if keys == [key.as_str()] {
        Ok(())
    } else {
        Err(format!("expected only '{key}' deployed, found {keys:?}"))
    }
}

#[then("the captured error names the last {key} task")]
fn captured_error_names_last_task(process_state: &ProcessState, key: String) -> StepResult<()> {
    let last_id = process_state
        .engine()?
        .tasks_by_definition_key(&key)
        .map_err(|e| e.to_string())?
        .pop()
        .map(|task| task.id)
        .ok_or_else(|| format!("no '{key}' task is active"))?;
    process_state.with_scenario(|scenario| {
        scenario
            .then()
            .engine_error_captured()?
            .captured_error_contains(&format!("'{last_id}'"))?;
        Ok(())
    })
}
