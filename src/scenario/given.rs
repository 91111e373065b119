//! Given stage: preconditions recorded into scenario state.

use serde_json::Value;

use super::state::{ScenarioState, StartMarker};
use crate::engine::Variables;

/// Records the business key, variable payload, and start-position marker
/// used by the next process creation.
#[derive(Debug)]
pub struct Given<'a> {
    state: &'a mut ScenarioState,
}

impl<'a> Given<'a> {
    pub(crate) const fn new(state: &'a mut ScenarioState) -> Self {
        Self { state }
    }

    /// Marks the scenario as running against its configured engine.
    pub const fn a_process_engine(self) -> Self {
        self
    }

    /// Use `business_key` for processes created from now on.
    pub fn a_business_key(mut self, business_key: &str) -> Self {
        self.state.set_business_key(business_key);
        self
    }

    /// Start from an empty variable payload.
    pub fn a_process_model(mut self) -> Self {
        self.state.replace_model(Variables::new());
        self
    }

    /// Replace the variable payload with `model`.
    pub fn a_process_model_with(mut self, model: Variables) -> Self {
        self.state.replace_model(model);
        self
    }

    /// Add or overwrite one payload variable.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.state.put_model_value(name, value.into());
        self
    }

    /// Add or overwrite several payload variables.
    pub fn with_all(mut self, variables: &Variables) -> Self {
        for (name, value) in variables {
            self.state.put_model_value(name, value.clone());
        }
        self
    }

    /// Start the next process immediately before `activity_id`, clearing
    /// any "after" marker.
    pub fn before_activity(mut self, activity_id: &str) -> Self {
        self.state
            .set_start_marker(StartMarker::Before(activity_id.to_owned()));
        self
    }

    /// Start the next process immediately after `activity_id`, clearing
    /// any "before" marker.
    pub fn after_activity(mut self, activity_id: &str) -> Self {
        self.state
            .set_start_marker(StartMarker::After(activity_id.to_owned()));
        self
    }

    /// The state recorded so far.
    #[must_use]
    pub fn state(&self) -> &ScenarioState {
        &*self.state
    }
}
