//! Given/When/Then scenarios against an engine client.
//!
//! A [`Scenario`] owns the collaborators a scenario needs (engine handle,
//! job drainer, clock controller, background pool, configuration) and the
//! [`ScenarioState`] threaded between stages. Each stage borrows both:
//!
//! ```
//! use std::sync::Arc;
//!
//! use procspec::config::ScenarioConfig;
//! use procspec::engine::memory::{InMemoryEngine, ProcessModel, UserTaskSpec};
//! use procspec::scenario::Scenario;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(InMemoryEngine::new());
//! engine.deploy(
//!     ProcessModel::new("TestProcess")
//!         .user_task("UserTask_ReviewResults", UserTaskSpec::named("Review Results")),
//! )?;
//!
//! let mut scenario = Scenario::new(engine, ScenarioConfig::default());
//! scenario.given().a_business_key("12345").with("message", "Hello World!");
//! scenario.when().create_a_process("TestProcess")?;
//! scenario
//!     .then()
//!     .active_processes_of_type(1, "TestProcess")?
//!     .active_task("UserTask_ReviewResults")?
//!     .with_task_name("Review Results")?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping the scenario tears it down: every active process instance is
//! deleted and the engine clock is reset, whether or not the scenario's
//! assertions passed.

mod given;
mod model;
mod state;
mod then;
mod when;

use std::sync::Arc;

pub use given::Given;
pub use model::ModelSelection;
pub use state::{AliasMap, ScenarioState, StartMarker};
pub use then::{Then, UserTaskProperties};
pub use when::When;

use crate::clock::ClockController;
use crate::config::ScenarioConfig;
use crate::engine::{EngineClient, EngineClock, JobExecutor, RuntimeService};
use crate::error::ScenarioError;
use crate::jobs::{BackgroundScheduler, DrainSettings, JobDrainer, Pause};

/// Collaborators shared by all stages of one scenario.
pub(crate) struct Services {
    pub(crate) engine: Arc<dyn EngineClient>,
    pub(crate) drainer: JobDrainer,
    pub(crate) clock: ClockController,
    pub(crate) background: BackgroundScheduler,
    pub(crate) config: ScenarioConfig,
}

impl Services {
    fn new(engine: Arc<dyn EngineClient>, config: ScenarioConfig) -> Self {
        let executor: Arc<dyn JobExecutor> = engine.clone();
        let engine_clock: Arc<dyn EngineClock> = engine.clone();
        let drainer = JobDrainer::new(executor, DrainSettings::from(&config.drain));
        let clock = ClockController::new(engine_clock, drainer.clone());
        let background = BackgroundScheduler::new(config.background.workers);
        Self {
            engine,
            drainer,
            clock,
            background,
            config,
        }
    }
}

/// One Given/When/Then scenario run against an engine.
pub struct Scenario {
    services: Services,
    state: ScenarioState,
    torn_down: bool,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("state", &self.state)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl Scenario {
    /// Start a scenario against `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn EngineClient>, config: ScenarioConfig) -> Self {
        tracing::debug!("starting scenario");
        Self {
            services: Services::new(engine, config),
            state: ScenarioState::default(),
            torn_down: false,
        }
    }

    /// Replace how drains wait between polls.
    #[must_use]
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        let drainer = self.services.drainer.clone().with_pause(pause);
        let engine_clock: Arc<dyn EngineClock> = self.services.engine.clone();
        self.services.clock = ClockController::new(engine_clock, drainer.clone());
        self.services.drainer = drainer;
        self
    }

    /// Establish preconditions.
    pub fn given(&mut self) -> Given<'_> {
        Given::new(&mut self.state)
    }

    /// Act on the engine.
    pub fn when(&mut self) -> When<'_> {
        When::new(&self.services, &mut self.state)
    }

    /// Assert on the engine and the scenario state.
    pub fn then(&mut self) -> Then<'_> {
        Then::new(&self.services, &mut self.state)
    }

    /// The scenario state.
    #[must_use]
    pub const fn state(&self) -> &ScenarioState {
        &self.state
    }

    /// The engine the scenario runs against.
    #[must_use]
    pub fn engine(&self) -> &dyn EngineClient {
        self.services.engine.as_ref()
    }

    /// The clock controller.
    #[must_use]
    pub const fn clock(&self) -> &ClockController {
        &self.services.clock
    }

    /// The job drainer.
    #[must_use]
    pub const fn drainer(&self) -> &JobDrainer {
        &self.services.drainer
    }

    /// The configuration the scenario runs with.
    #[must_use]
    pub const fn config(&self) -> &ScenarioConfig {
        &self.services.config
    }

    /// Delete every active process instance and reset the engine clock.
    ///
    /// Runs at most once; later calls return immediately. Every instance is
    /// attempted even when an earlier deletion fails.
    ///
    /// # Errors
    ///
    /// Returns the first engine error met while cleaning up.
    pub fn teardown(&mut self) -> Result<(), ScenarioError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let engine = &self.services.engine;
        let reason = self.services.config.teardown_reason.as_str();
        let mut first_error = None;

        match engine.instances() {
            Ok(instances) => {
                for instance in instances {
                    if let Err(e) = engine.delete(&instance.id, reason) {
                        tracing::warn!(process_id = %instance.id, error = %e, "failed to delete process during teardown");
                        first_error.get_or_insert(ScenarioError::from(e));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to list processes during teardown");
                first_error.get_or_insert(ScenarioError::from(e));
            }
        }

        if let Err(e) = self.services.clock.reset() {
            tracing::warn!(error = %e, "failed to reset clock during teardown");
            first_error.get_or_insert(e);
        }

        tracing::debug!("scenario torn down");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::warn!(error = %e, "scenario teardown failed");
        }
    }
}

#[cfg(test)]
mod tests;
