//! Behavioural tests for Given/When/Then scenarios on the in-memory engine.

mod bdd_process_scenarios_helpers;

use bdd_process_scenarios_helpers::{ProcessState, process_state};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/process_scenarios.feature",
    name = "Message start waits at the review task"
)]
fn message_start_waits_at_review_task(process_state: ProcessState) {
    let _ = process_state;
}

#[scenario(
    path = "tests/features/process_scenarios.feature",
    name = "Completing the review ends the process"
)]
fn completing_review_ends_process(process_state: ProcessState) {
    let _ = process_state;
}

#[scenario(
    path = "tests/features/process_scenarios.feature",
    name = "Only the review process is deployed"
)]
fn only_review_process_is_deployed(process_state: ProcessState) {
    let _ = process_state;
}

#[scenario(
    path = "tests/features/process_scenarios.feature",
    name = "Completing every failing task keeps the last error"
)]
fn completing_failing_tasks_keeps_last_error(process_state: ProcessState) {
    let _ = process_state;
}

#[scenario(
    path = "tests/features/process_scenarios.feature",
    name = "Timer waits until the clock moves"
)]
fn timer_waits_until_clock_moves(process_state: ProcessState) {
    let _ = process_state;
}
