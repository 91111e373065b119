//! Control over the engine's simulated current time.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::engine::EngineClock;
use crate::error::ScenarioError;
use crate::jobs::JobDrainer;

/// Moves the engine clock and optionally drains the jobs that became due.
///
/// The controller never executes jobs itself; a drain after a move is what
/// lets timers that fell due actually fire.
#[derive(Clone)]
pub struct ClockController {
    clock: Arc<dyn EngineClock>,
    drainer: JobDrainer,
}

impl std::fmt::Debug for ClockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockController")
            .field("drainer", &self.drainer)
            .finish_non_exhaustive()
    }
}

impl ClockController {
    /// Create a controller over `clock`, draining through `drainer`.
    #[must_use]
    pub fn new(clock: Arc<dyn EngineClock>, drainer: JobDrainer) -> Self {
        Self { clock, drainer }
    }

    /// The engine's current time.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::EngineOperation` if the clock cannot be read.
    pub fn now(&self) -> Result<DateTime<Utc>, ScenarioError> {
        Ok(self.clock.now()?)
    }

    /// Move the clock forward by `duration` and return the new time.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidState` if the new time is out of range,
    /// and propagates engine and drain failures.
    pub fn advance(
        &self,
        duration: TimeDelta,
        drain_after: bool,
    ) -> Result<DateTime<Utc>, ScenarioError> {
        let current = self.clock.now()?;
        let target = current.checked_add_signed(duration).ok_or_else(|| {
            ScenarioError::invalid_state(format!("cannot advance {current} by {duration}"))
        })?;
        tracing::info!(by = %duration, to = %target, "increment clock");
        self.move_to(target, drain_after)
    }

    /// Set the clock to `time`, which may lie in the past, and return the
    /// time the engine reports afterwards.
    ///
    /// # Errors
    ///
    /// Propagates engine and drain failures.
    pub fn set_to(
        &self,
        time: DateTime<Utc>,
        drain_after: bool,
    ) -> Result<DateTime<Utc>, ScenarioError> {
        tracing::info!(to = %time, "set clock");
        self.move_to(time, drain_after)
    }

    /// Return the engine to wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::EngineOperation` if the clock cannot be reset.
    pub fn reset(&self) -> Result<(), ScenarioError> {
        self.clock.reset()?;
        tracing::debug!("reset clock");
        Ok(())
    }

    fn move_to(
        &self,
        time: DateTime<Utc>,
        drain_after: bool,
    ) -> Result<DateTime<Utc>, ScenarioError> {
        self.clock.set_now(time)?;
        if drain_after {
            self.drainer.drain()?;
        }
        Ok(self.clock.now()?)
    }
}
