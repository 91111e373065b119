//! Scenario-level tests against the in-memory engine.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::engine::memory::{InMemoryEngine, ProcessModel, UserTaskSpec};
use crate::engine::{EngineClock, HistoryService, RuntimeService, TaskService, Variables};
use crate::error::EngineError;

fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), value.clone()))
        .collect()
}

#[fixture]
fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Engine with a review process, an approval process that needs a decision,
/// and a process that waits on a one hour timer.
#[fixture]
fn engine(start_time: DateTime<Utc>) -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new());
    engine
        .deploy(
            ProcessModel::new("TestProcess")
                .named("Test Process")
                .message_start("TestProcess")
                .user_task(
                    "UserTask_ReviewResults",
                    UserTaskSpec::named("Review Results")
                        .candidate_group("reviewers")
                        .candidate_user("jane")
                        .priority(60)
                        .form_key("embedded:review")
                        .description("Check the results")
                        .due_in(TimeDelta::days(2))
                        .local_variable("channel", json!("email")),
                ),
        )
        .expect("deploy review process");
    engine
        .deploy(
            ProcessModel::new("Approval").user_task(
                "UserTask_Approve",
                UserTaskSpec::named("Approve").requires("approved"),
            ),
        )
        .expect("deploy approval process");
    engine
        .deploy(
            ProcessModel::new("Reminder")
                .timer("Timer_OneHour", TimeDelta::hours(1))
                .user_task("UserTask_Remind", UserTaskSpec::named("Remind")),
        )
        .expect("deploy reminder process");
    engine.set_now(start_time).expect("pin clock");
    engine
}

#[fixture]
fn scenario(engine: Arc<InMemoryEngine>) -> Scenario {
    Scenario::new(engine, ScenarioConfig::default())
}

#[rstest]
fn message_start_waits_at_review_task(mut scenario: Scenario, start_time: DateTime<Utc>) {
    scenario
        .given()
        .a_process_engine()
        .a_business_key("12345")
        .with("message", "Hello World!");
    scenario
        .when()
        .create_a_process_by_message("TestProcess")
        .expect("create by message");

    scenario
        .then()
        .active_processes_of_type(1, "TestProcess")
        .and_then(|then| then.active_task("UserTask_ReviewResults"))
        .and_then(|then| then.with_task_name("Review Results"))
        .and_then(|then| then.with_candidate_group("reviewers"))
        .and_then(|then| then.with_candidate_user("jane"))
        .and_then(|then| then.no_assignee())
        .and_then(|then| then.with_due_date_in_future(TimeDelta::days(2)))
        .and_then(|then| then.with_due_date(start_time + TimeDelta::days(2)))
        .and_then(|then| then.with_task_local_variable("channel", "email"))
        .expect("review task is waiting");
}

#[rstest]
fn completing_review_ends_the_process(mut scenario: Scenario) {
    scenario
        .given()
        .a_business_key("12345")
        .with("message", "Hello World!");
    scenario
        .when()
        .create_a_process_by_message("TestProcess")
        .and_then(|when| when.complete_task("UserTask_ReviewResults"))
        .expect("create and complete");

    scenario
        .then()
        .no_active_processes()
        .and_then(|then| then.no_active_tasks())
        .and_then(|then| then.completed_tasks(1))
        .and_then(|then| then.completed_task("UserTask_ReviewResults"))
        .and_then(|then| then.with_completed_task_name("Review Results"))
        .and_then(|then| then.with_activities(&["UserTask_ReviewResults", "Review Results"]))
        .and_then(|then| then.process_history())
        .and_then(|then| then.contains("message", "Hello World!"))
        .expect("process ran to its end");
}

#[rstest]
fn after_marker_skips_the_task(mut scenario: Scenario) {
    scenario.given().after_activity("UserTask_ReviewResults");
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create after task");

    scenario
        .then()
        .no_active_processes()
        .and_then(|then| then.without_activity("UserTask_ReviewResults"))
        .expect("task was skipped");
}

#[rstest]
fn before_marker_starts_at_the_task(mut scenario: Scenario) {
    scenario.given().before_activity("UserTask_ReviewResults");
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create before task");

    scenario
        .then()
        .active_tasks_of_type(1, "UserTask_ReviewResults")
        .expect("task is waiting");
}

#[rstest]
fn engine_rejection_is_captured_by_default(mut scenario: Scenario) {
    scenario
        .when()
        .create_a_process("Approval")
        .and_then(|when| when.complete_task("UserTask_Approve"))
        .expect("rejection is captured");

    scenario
        .then()
        .engine_error_captured()
        .and_then(|then| then.captured_error_contains("variable 'approved' is required"))
        .and_then(|then| then.active_tasks_of_type(1, "UserTask_Approve"))
        .expect("task is still active");
}

#[rstest]
fn propagating_stage_returns_engine_rejection(mut scenario: Scenario) {
    scenario
        .when()
        .create_a_process("Approval")
        .expect("create approval");

    let error = scenario
        .when()
        .propagating()
        .complete_task("UserTask_Approve")
        .expect_err("rejection propagates");

    assert!(matches!(
        error,
        ScenarioError::EngineOperation(EngineError::Rejected { .. })
    ));
    assert!(scenario.state().captured_error().is_none());
}

#[rstest]
fn completing_a_missing_task_fails_the_precondition(mut scenario: Scenario) {
    let error = scenario
        .when()
        .complete_task("UserTask_ReviewResults")
        .expect_err("no task is active");

    assert!(matches!(
        error,
        ScenarioError::PreconditionFailed { ref message }
            if message == "expected exactly 1 active task 'UserTask_ReviewResults', found 0"
    ));
}

#[rstest]
fn process_aliases_survive_refocus(mut scenario: Scenario) {
    scenario.given().with("order", 1);
    scenario
        .when()
        .create_a_process("TestProcess")
        .and_then(|when| when.referenced_as("first"))
        .expect("first process");
    scenario.given().with("order", 2);
    scenario
        .when()
        .create_a_process("TestProcess")
        .and_then(|when| when.referenced_as("second"))
        .expect("second process");

    scenario
        .then()
        .active_processes(2)
        .and_then(|then| then.process_runtime_for("first"))
        .and_then(|then| then.contains("order", 1))
        .and_then(|then| then.process_runtime())
        .and_then(|then| then.contains("order", 2))
        .expect("aliases resolve to their own processes");
}

#[rstest]
fn task_alias_completes_the_registered_task(mut scenario: Scenario) {
    scenario
        .when()
        .create_a_process("Approval")
        .expect("create approval");
    scenario
        .then()
        .active_task("UserTask_Approve")
        .and_then(|then| then.referenced_as("approval"))
        .expect("alias the task");

    scenario
        .when()
        .complete_task_referenced_as("approval", &vars(&[("approved", json!(true))]))
        .expect("complete by alias");

    scenario
        .then()
        .completed_task_referenced_as("approval")
        .and_then(|then| then.task_history())
        .expect("completed task is focused");
    assert_eq!(
        scenario.state().task_aliases().resolve("approval").ok(),
        scenario.state().history_task_id()
    );
}

#[rstest]
fn advancing_the_clock_fires_the_timer(mut scenario: Scenario, start_time: DateTime<Utc>) {
    scenario
        .when()
        .create_a_process("Reminder")
        .expect("create reminder");
    scenario
        .then()
        .no_active_tasks()
        .expect("timer is waiting");

    scenario
        .when()
        .advance_clock(TimeDelta::hours(1))
        .expect("advance clock");

    scenario
        .then()
        .clock_reads(start_time + TimeDelta::hours(1))
        .and_then(|then| then.active_tasks_of_type(1, "UserTask_Remind"))
        .expect("timer fired");
}

#[rstest]
fn history_detail_lists_every_value(mut scenario: Scenario) {
    scenario.given().with("status", "new");
    scenario
        .when()
        .create_a_process("TestProcess")
        .and_then(|when| when.set_variables(&vars(&[("status", json!("reviewed"))])))
        .expect("update status");

    scenario
        .then()
        .process_history_detail()
        .and_then(|then| then.contains("status", json!(["new", "reviewed"])))
        .expect("both values recorded");
}

#[rstest]
fn task_properties_are_checked_together(engine: Arc<InMemoryEngine>) {
    let mut scenario = Scenario::new(engine.clone(), ScenarioConfig::default());
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");
    let task_id = engine
        .tasks_by_definition_key("UserTask_ReviewResults")
        .expect("list tasks")
        .into_iter()
        .next()
        .map(|task| task.id)
        .expect("review task");
    engine
        .add_task_comment(&task_id, "looks good")
        .expect("add comment");

    let expected = UserTaskProperties::default()
        .name("Review Results")
        .candidate_group("reviewers")
        .priority(60)
        .description("Check the results")
        .comment("looks good");
    scenario
        .then()
        .active_task("UserTask_ReviewResults")
        .and_then(|then| then.with_form_key("embedded:review"))
        .and_then(|then| then.with_task_properties(&expected))
        .expect("properties match");

    let error = scenario
        .then()
        .with_task_properties(&UserTaskProperties::default().priority(10))
        .expect_err("priority differs");
    assert!(matches!(error, ScenarioError::AssertionFailure { .. }));
}

#[rstest]
fn teardown_deletes_processes_once(engine: Arc<InMemoryEngine>) {
    let mut scenario = Scenario::new(engine.clone(), ScenarioConfig::default());
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");

    scenario.teardown().expect("first teardown");
    scenario.teardown().expect("second teardown");

    assert!(engine.instances().expect("list instances").is_empty());
    let reasons: Vec<Option<String>> = engine
        .historic_tasks()
        .expect("history")
        .into_iter()
        .map(|task| task.delete_reason)
        .collect();
    assert_eq!(reasons, vec![Some(String::from("cleanup"))]);
}

#[rstest]
fn dropping_the_scenario_tears_it_down(engine: Arc<InMemoryEngine>, start_time: DateTime<Utc>) {
    {
        let mut scenario = Scenario::new(engine.clone(), ScenarioConfig::default());
        scenario
            .when()
            .create_a_process("TestProcess")
            .expect("create review");
    }

    assert!(engine.instances().expect("list instances").is_empty());
    assert_ne!(engine.now().expect("read clock"), start_time);
}

#[rstest]
fn background_job_sees_the_engine(mut scenario: Scenario) {
    let handle = scenario
        .when()
        .schedule("start review", |engine| {
            engine.start("TestProcess", None, &Variables::new())?;
            Ok(())
        })
        .expect("schedule job");

    handle.join().expect("job succeeds");
    scenario
        .then()
        .active_processes_of_type(1, "TestProcess")
        .expect("job started a process");
}

#[derive(Debug, Clone, Copy)]
enum Snapshot {
    Runtime,
    History,
    Detail,
    TaskRuntime,
}

fn select_snapshot(then: Then<'_>, snapshot: Snapshot) -> Result<Then<'_>, ScenarioError> {
    match snapshot {
        Snapshot::Runtime => then.process_runtime(),
        Snapshot::History => then.process_history(),
        Snapshot::Detail => then.process_history_detail(),
        Snapshot::TaskRuntime => then
            .active_task("UserTask_ReviewResults")
            .and_then(Then::task_runtime),
    }
}

#[rstest]
#[case(Snapshot::Runtime)]
#[case(Snapshot::History)]
#[case(Snapshot::Detail)]
#[case(Snapshot::TaskRuntime)]
fn selecting_a_model_twice_keeps_the_same_snapshot(
    mut scenario: Scenario,
    #[case] snapshot: Snapshot,
) {
    scenario.given().with("message", "Hello World!");
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");

    select_snapshot(scenario.then(), snapshot).expect("first selection");
    let first = scenario.state().selection().cloned();
    select_snapshot(scenario.then(), snapshot).expect("second selection");

    assert!(first.is_some());
    assert_eq!(scenario.state().selection().cloned(), first);
}

#[rstest]
#[case("contains_key")]
#[case("contains_key_with_value")]
#[case("contains_key_with_empty_value")]
#[case("contains_keys")]
#[case("contains")]
fn model_assertions_need_a_selection(mut scenario: Scenario, #[case] assertion: &str) {
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");

    let then = scenario.then();
    let result = match assertion {
        "contains_key" => then.contains_key("message"),
        "contains_key_with_value" => then.contains_key_with_value("message"),
        "contains_key_with_empty_value" => then.contains_key_with_empty_value("message"),
        "contains_keys" => then.contains_keys(&["message"]),
        _ => then.contains("message", "Hello World!"),
    };

    assert!(matches!(
        result,
        Err(ScenarioError::InvalidState { ref message }) if message == "no model has been selected"
    ));
}

#[rstest]
fn empty_string_counts_as_a_value(mut scenario: Scenario) {
    scenario
        .given()
        .with("note", "")
        .with("reviewer", serde_json::Value::Null);
    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");

    scenario
        .then()
        .process_runtime()
        .and_then(|then| then.contains_key_with_value("note"))
        .and_then(|then| then.contains_key_with_empty_value("reviewer"))
        .expect("empty string is a value and null is empty");
    let error = scenario
        .then()
        .process_runtime()
        .and_then(|then| then.contains_key_with_empty_value("note"))
        .expect_err("empty string is not empty");
    assert!(matches!(error, ScenarioError::AssertionFailure { .. }));
}

#[rstest]
fn completed_task_name_is_checked(mut scenario: Scenario) {
    scenario
        .when()
        .create_a_process("TestProcess")
        .and_then(|when| when.complete_task("UserTask_ReviewResults"))
        .expect("create and complete");

    let error = scenario
        .then()
        .completed_task("UserTask_ReviewResults")
        .and_then(|then| then.with_completed_task_name("Approve"))
        .expect_err("name differs");
    assert!(matches!(
        error,
        ScenarioError::AssertionFailure { ref message }
            if message.contains("is named 'Review Results', expected 'Approve'")
    ));

    scenario
        .then()
        .with_completed_task_name("Review Results")
        .expect("name matches");
}

#[rstest]
fn empty_candidate_expects_no_candidates(mut scenario: Scenario) {
    scenario
        .when()
        .create_a_process("Approval")
        .expect("create approval");
    scenario
        .then()
        .active_task("UserTask_Approve")
        .and_then(|then| then.with_candidate_user(""))
        .and_then(|then| then.with_candidate_group(""))
        .expect("approval task has no candidates");

    scenario
        .when()
        .create_a_process("TestProcess")
        .expect("create review");
    let error = scenario
        .then()
        .active_task("UserTask_ReviewResults")
        .and_then(|then| then.with_candidate_user(""))
        .expect_err("review task has a candidate user");
    assert!(matches!(error, ScenarioError::AssertionFailure { .. }));
    let error = scenario
        .then()
        .with_candidate_group("")
        .expect_err("review task has a candidate group");
    assert!(matches!(error, ScenarioError::AssertionFailure { .. }));
}

#[rstest]
fn assignee_and_follow_up_can_be_excluded(
    engine: Arc<InMemoryEngine>,
    start_time: DateTime<Utc>,
) {
    engine
        .deploy(
            ProcessModel::new("Escalation").user_task(
                "UserTask_Escalate",
                UserTaskSpec::named("Escalate")
                    .assignee("john")
                    .follow_up_in(TimeDelta::days(1)),
            ),
        )
        .expect("deploy escalation process");
    let mut scenario = Scenario::new(engine, ScenarioConfig::default());
    scenario
        .when()
        .create_a_process("Escalation")
        .and_then(|when| when.create_a_process("Approval"))
        .expect("create processes");

    scenario
        .then()
        .active_task("UserTask_Escalate")
        .and_then(|then| then.without_assignee("jane"))
        .and_then(|then| then.with_follow_up_date(Some(start_time + TimeDelta::days(1))))
        .expect("escalation task is john's");
    let error = scenario
        .then()
        .without_assignee("john")
        .expect_err("john is the assignee");
    assert!(matches!(
        error,
        ScenarioError::AssertionFailure { ref message }
            if message == "task 'UserTask_Escalate' is unexpectedly assigned to 'john'"
    ));

    scenario
        .then()
        .active_task("UserTask_Approve")
        .and_then(|then| then.without_assignee("john"))
        .and_then(|then| then.with_follow_up_date(None))
        .expect("approval task is unassigned without follow-up");
}
