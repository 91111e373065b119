//! Given/when steps for process scenarios.

use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, TimeZone, Utc};
use procspec::config::ScenarioConfig;
use procspec::engine::EngineClock;
use procspec::engine::memory::{InMemoryEngine, ProcessModel, UserTaskSpec};
use procspec::scenario::Scenario;
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::ProcessState;

fn model_named(name: &str) -> StepResult<ProcessModel> {
    match name {
        "review" => Ok(ProcessModel::new("TestProcess")
            .named("Test Process")
            .message_start("TestProcess")
            .user_task(
                "UserTask_ReviewResults",
                UserTaskSpec::named("Review Results").candidate_group("reviewers"),
            )),
        "approval" => Ok(ProcessModel::new("Approval").user_task(
            "UserTask_Approve",
            UserTaskSpec::named("Approve").requires("approved"),
        )),
        "reminder" => Ok(ProcessModel::new("Reminder")
            .timer("Timer_OneHour", TimeDelta::hours(1))
            .user_task("UserTask_Remind", UserTaskSpec::named("Remind"))),
        other => Err(format!("unknown process model '{other}'")),
    }
}

#[given("a process engine with the {name} process deployed")]
fn given_engine_with_process(process_state: &ProcessState, name: String) -> StepResult<()> {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .deploy(model_named(&name)?)
        .map_err(|e| e.to_string())?;
    let start = Utc
        .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .ok_or_else(|| String::from("invalid start time"))?;
    engine.set_now(start).map_err(|e| e.to_string())?;

    let mut scenario = Scenario::new(engine.clone(), ScenarioConfig::default());
    scenario.given().a_process_engine();
    process_state.engine.set(engine);
    process_state.scenario.set(Arc::new(Mutex::new(scenario)));
    Ok(())
}

#[given("the business key {business_key}")]
fn given_business_key(process_state: &ProcessState, business_key: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.given().a_business_key(&business_key);
        Ok(())
    })
}

#[given("the process variable {name} is {value}")]
fn given_process_variable(
    process_state: &ProcessState,
    name: String,
    value: String,
) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.given().with(&name, value);
        Ok(())
    })
}

#[when("a process is created by message {message}")]
fn when_created_by_message(process_state: &ProcessState, message: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.when().create_a_process_by_message(&message)?;
        Ok(())
    })
}

#[when("a process of type {key} is created")]
fn when_process_created(process_state: &ProcessState, key: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.when().create_a_process(&key)?;
        Ok(())
    })
}

#[when("{count} processes of type {key} are created")]
fn when_processes_created(
    process_state: &ProcessState,
    count: usize,
    key: String,
) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        for _ in 0..count {
            scenario.when().create_a_process(&key)?;
        }
        Ok(())
    })
}

#[when("the task {key} is completed")]
fn when_task_completed(process_state: &ProcessState, key: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.when().complete_task(&key)?;
        Ok(())
    })
}

#[when("every {key} task is completed")]
fn when_every_task_completed(process_state: &ProcessState, key: String) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.when().complete_all_tasks(&key)?;
        Ok(())
    })
}

#[when("the clock advances by {minutes} minutes")]
fn when_clock_advances(process_state: &ProcessState, minutes: i64) -> StepResult<()> {
    process_state.with_scenario(|scenario| {
        scenario.when().advance_clock(TimeDelta::minutes(minutes))?;
        Ok(())
    })
}
