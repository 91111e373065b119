//! Scenario-scoped mutable state shared by the Given, When, and Then stages.

use std::collections::BTreeMap;

use serde_json::Value;

use super::model::ModelSelection;
use crate::engine::{CorrelationResult, Variables};
use crate::error::{AliasKind, EngineError, ScenarioError};

/// Where the next created process starts, relative to an activity.
///
/// Holding at most one marker keeps "before" and "after" mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartMarker {
    /// Start immediately before the activity with this id.
    Before(String),
    /// Start immediately after the activity with this id.
    After(String),
}

/// Append-only map from scenario-local names to engine ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMap {
    kind: AliasKind,
    entries: BTreeMap<String, String>,
}

impl AliasMap {
    const fn new(kind: AliasKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    fn register(&mut self, name: &str, id: &str) -> Result<(), ScenarioError> {
        if self.entries.contains_key(name) {
            return Err(ScenarioError::AliasConflict {
                kind: self.kind,
                name: name.to_owned(),
            });
        }
        self.entries.insert(name.to_owned(), id.to_owned());
        Ok(())
    }

    /// Resolve `name` to the engine id it was registered with.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::AliasNotFound` if `name` was never registered.
    pub fn resolve(&self, name: &str) -> Result<&str, ScenarioError> {
        self.entries
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ScenarioError::AliasNotFound {
                kind: self.kind,
                name: name.to_owned(),
            })
    }

    /// Number of registered aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no alias has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a scenario remembers between stage calls.
#[derive(Debug, Clone)]
pub struct ScenarioState {
    business_key: Option<String>,
    model: Variables,
    start_marker: Option<StartMarker>,
    process_id: Option<String>,
    process_aliases: AliasMap,
    task_id: Option<String>,
    history_task_id: Option<String>,
    task_aliases: AliasMap,
    captured_error: Option<EngineError>,
    correlation_result: Option<CorrelationResult>,
    selection: Option<ModelSelection>,
}

impl Default for ScenarioState {
    fn default() -> Self {
        Self {
            business_key: None,
            model: Variables::new(),
            start_marker: None,
            process_id: None,
            process_aliases: AliasMap::new(AliasKind::Process),
            task_id: None,
            history_task_id: None,
            task_aliases: AliasMap::new(AliasKind::Task),
            captured_error: None,
            correlation_result: None,
            selection: None,
        }
    }
}

impl ScenarioState {
    /// Business key used when creating processes.
    #[must_use]
    pub fn business_key(&self) -> Option<&str> {
        self.business_key.as_deref()
    }

    pub(crate) fn set_business_key(&mut self, business_key: &str) {
        self.business_key = Some(business_key.to_owned());
    }

    /// Variable payload used when creating processes.
    #[must_use]
    pub const fn model(&self) -> &Variables {
        &self.model
    }

    pub(crate) fn replace_model(&mut self, model: Variables) {
        self.model = model;
    }

    pub(crate) fn put_model_value(&mut self, name: &str, value: Value) {
        self.model.insert(name.to_owned(), value);
    }

    /// The active start-position marker, if any.
    #[must_use]
    pub const fn start_marker(&self) -> Option<&StartMarker> {
        self.start_marker.as_ref()
    }

    /// Activity the next process starts before, if that marker is set.
    #[must_use]
    pub fn before_activity(&self) -> Option<&str> {
        match &self.start_marker {
            Some(StartMarker::Before(activity)) => Some(activity),
            _ => None,
        }
    }

    /// Activity the next process starts after, if that marker is set.
    #[must_use]
    pub fn after_activity(&self) -> Option<&str> {
        match &self.start_marker {
            Some(StartMarker::After(activity)) => Some(activity),
            _ => None,
        }
    }

    pub(crate) fn set_start_marker(&mut self, marker: StartMarker) {
        self.start_marker = Some(marker);
    }

    /// The focus process.
    #[must_use]
    pub fn process_id(&self) -> Option<&str> {
        self.process_id.as_deref()
    }

    pub(crate) fn focus_process(&mut self, id: &str) {
        self.process_id = Some(id.to_owned());
    }

    /// The focus process, or `InvalidState` if none was created yet.
    pub(crate) fn require_process(&self) -> Result<&str, ScenarioError> {
        self.process_id()
            .ok_or_else(|| ScenarioError::invalid_state("no process has been created"))
    }

    /// Aliases registered for process instances.
    #[must_use]
    pub const fn process_aliases(&self) -> &AliasMap {
        &self.process_aliases
    }

    pub(crate) fn register_process_alias(&mut self, name: &str) -> Result<(), ScenarioError> {
        let id = self.require_process()?.to_owned();
        self.process_aliases.register(name, &id)?;
        tracing::debug!(alias = name, process_id = %id, "registered process alias");
        Ok(())
    }

    /// The focus task.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub(crate) fn focus_task(&mut self, id: &str) {
        self.task_id = Some(id.to_owned());
    }

    pub(crate) fn require_task(&self) -> Result<&str, ScenarioError> {
        self.task_id()
            .ok_or_else(|| ScenarioError::invalid_state("no task has been selected"))
    }

    /// The focus historic task.
    #[must_use]
    pub fn history_task_id(&self) -> Option<&str> {
        self.history_task_id.as_deref()
    }

    pub(crate) fn focus_history_task(&mut self, id: &str) {
        self.history_task_id = Some(id.to_owned());
    }

    pub(crate) fn require_history_task(&self) -> Result<&str, ScenarioError> {
        self.history_task_id()
            .ok_or_else(|| ScenarioError::invalid_state("no completed task has been selected"))
    }

    /// Aliases registered for tasks.
    #[must_use]
    pub const fn task_aliases(&self) -> &AliasMap {
        &self.task_aliases
    }

    pub(crate) fn register_task_alias(&mut self, name: &str) -> Result<(), ScenarioError> {
        let id = self.require_task()?.to_owned();
        self.task_aliases.register(name, &id)?;
        tracing::debug!(alias = name, task_id = %id, "registered task alias");
        Ok(())
    }

    /// The engine error captured by the latest capturing operation.
    #[must_use]
    pub const fn captured_error(&self) -> Option<&EngineError> {
        self.captured_error.as_ref()
    }

    pub(crate) fn capture(&mut self, error: EngineError) {
        tracing::info!(error = %error, "captured engine error");
        self.captured_error = Some(error);
    }

    /// Result of the latest "with result" message correlation.
    #[must_use]
    pub const fn correlation_result(&self) -> Option<&CorrelationResult> {
        self.correlation_result.as_ref()
    }

    pub(crate) fn set_correlation_result(&mut self, result: CorrelationResult) {
        self.correlation_result = Some(result);
    }

    /// The active model selection, if any.
    #[must_use]
    pub const fn selection(&self) -> Option<&ModelSelection> {
        self.selection.as_ref()
    }

    pub(crate) fn select(&mut self, selection: ModelSelection) {
        self.selection = Some(selection);
    }

    pub(crate) fn require_selection(&self) -> Result<&ModelSelection, ScenarioError> {
        self.selection
            .as_ref()
            .ok_or_else(|| ScenarioError::invalid_state("no model has been selected"))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn state() -> ScenarioState {
        ScenarioState::default()
    }

    #[rstest]
    fn markers_are_mutually_exclusive(mut state: ScenarioState) {
        state.set_start_marker(StartMarker::Before(String::from("A")));
        state.set_start_marker(StartMarker::After(String::from("B")));

        assert_eq!(state.before_activity(), None);
        assert_eq!(state.after_activity(), Some("B"));

        state.set_start_marker(StartMarker::Before(String::from("C")));

        assert_eq!(state.before_activity(), Some("C"));
        assert_eq!(state.after_activity(), None);
    }

    #[rstest]
    fn process_alias_survives_refocus(mut state: ScenarioState) {
        state.focus_process("process-1");
        state
            .register_process_alias("P1")
            .expect("first registration");
        state.focus_process("process-2");

        assert_eq!(state.process_aliases().resolve("P1").ok(), Some("process-1"));
        assert_eq!(state.process_id(), Some("process-2"));
    }

    #[rstest]
    fn alias_names_cannot_be_rebound(mut state: ScenarioState) {
        state.focus_process("process-1");
        state.register_process_alias("P1").expect("first registration");
        state.focus_process("process-2");

        let error = state
            .register_process_alias("P1")
            .expect_err("duplicate alias should be rejected");

        assert_eq!(error.to_string(), "process alias 'P1' is already registered");
        assert_eq!(state.process_aliases().len(), 1);
    }

    #[rstest]
    fn unknown_task_alias_is_reported(state: ScenarioState) {
        let error = state
            .task_aliases()
            .resolve("T9")
            .expect_err("unregistered alias should fail");
        assert_eq!(error.to_string(), "no task referenced as 'T9'");
    }

    #[rstest]
    fn aliasing_without_focus_is_invalid_state(mut state: ScenarioState) {
        let error = state
            .register_task_alias("T1")
            .expect_err("no task focused yet");
        assert!(matches!(error, ScenarioError::InvalidState { .. }));
    }

    #[rstest]
    fn later_capture_overwrites_earlier(mut state: ScenarioState) {
        state.capture(EngineError::Unavailable {
            message: String::from("first"),
        });
        state.capture(EngineError::Unavailable {
            message: String::from("second"),
        });

        assert_eq!(
            state.captured_error().map(ToString::to_string),
            Some(String::from("engine unavailable: second"))
        );
    }

    #[rstest]
    fn model_values_accumulate(mut state: ScenarioState) {
        state.put_model_value("a", json!(1));
        state.put_model_value("b", json!("two"));

        assert_eq!(state.model().len(), 2);
        assert_eq!(state.model().get("b"), Some(&json!("two")));
    }
}
