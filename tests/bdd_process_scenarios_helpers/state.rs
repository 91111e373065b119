//! Scenario state for process behavioural tests.

use std::sync::{Arc, Mutex};

use procspec::engine::memory::InMemoryEngine;
use procspec::error::ScenarioError;
use procspec::scenario::Scenario;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tracing_subscriber::EnvFilter;

use super::StepResult;

/// A scenario shared between step functions.
pub(crate) type SharedScenario = Arc<Mutex<Scenario>>;

#[derive(Default, ScenarioState)]
pub(crate) struct ProcessState {
    pub(crate) engine: Slot<Arc<InMemoryEngine>>,
    pub(crate) scenario: Slot<SharedScenario>,
}

impl ProcessState {
    /// Run `step` against the scenario, reporting failures as step errors.
    pub(crate) fn with_scenario<T>(
        &self,
        step: impl FnOnce(&mut Scenario) -> Result<T, ScenarioError>,
    ) -> StepResult<T> {
        let shared = self
            .scenario
            .get()
            .ok_or_else(|| String::from("no process engine has been set up"))?;
        let mut scenario = shared
            .lock()
            .map_err(|_| String::from("scenario lock poisoned"))?;
        step(&mut scenario).map_err(|e| e.to_string())
    }

    /// The engine behind the scenario.
    pub(crate) fn engine(&self) -> StepResult<Arc<InMemoryEngine>> {
        self.engine
            .get()
            .ok_or_else(|| String::from("no process engine has been set up"))
    }
}

/// Fresh state; `RUST_LOG` enables scenario logging in test output.
#[fixture]
pub(crate) fn process_state() -> ProcessState {
    // Fails once another scenario in this binary has installed it.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .unwrap_or_default();
    ProcessState::default()
}
