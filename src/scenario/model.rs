//! Variable snapshots that key/value assertions run against.

use serde_json::Value;

use crate::engine::{VariableUpdate, Variables};
use crate::error::ScenarioError;

/// The selected variable snapshot, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSelection {
    /// Runtime variables of a process instance.
    Runtime(Variables),
    /// Historic variables of a process instance.
    History(Variables),
    /// Every value each process variable has held, as a JSON array.
    Detail(Variables),
    /// Local variables of an active task.
    TaskRuntime(Variables),
    /// Local variables of a historic task.
    TaskHistory(Variables),
}

impl ModelSelection {
    /// Build a [`ModelSelection::Detail`] snapshot from an update log.
    #[must_use]
    pub fn detail(updates: Vec<VariableUpdate>) -> Self {
        let mut snapshot = Variables::new();
        for update in updates {
            let entry = snapshot
                .entry(update.name)
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(values) = entry {
                values.push(update.value);
            }
        }
        Self::Detail(snapshot)
    }

    /// Short name of the snapshot source, used in assertion messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Runtime(_) => "process runtime",
            Self::History(_) => "process history",
            Self::Detail(_) => "process history detail",
            Self::TaskRuntime(_) => "task runtime",
            Self::TaskHistory(_) => "task history",
        }
    }

    /// The cached snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &Variables {
        match self {
            Self::Runtime(snapshot)
            | Self::History(snapshot)
            | Self::Detail(snapshot)
            | Self::TaskRuntime(snapshot)
            | Self::TaskHistory(snapshot) => snapshot,
        }
    }

    fn lookup(&self, key: &str) -> Result<&Value, ScenarioError> {
        self.snapshot().get(key).ok_or_else(|| {
            ScenarioError::assertion(format!("{} has no key '{key}'", self.label()))
        })
    }

    pub(crate) fn check_key(&self, key: &str) -> Result<(), ScenarioError> {
        self.lookup(key).map(|_| ())
    }

    pub(crate) fn check_key_with_value(&self, key: &str) -> Result<(), ScenarioError> {
        if is_empty_value(self.lookup(key)?) {
            return Err(ScenarioError::assertion(format!(
                "{} key '{key}' has an empty value",
                self.label()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_key_with_empty_value(&self, key: &str) -> Result<(), ScenarioError> {
        let value = self.lookup(key)?;
        if !is_empty_value(value) {
            return Err(ScenarioError::assertion(format!(
                "{} key '{key}' should be empty but is {value}",
                self.label()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_entry(&self, key: &str, expected: &Value) -> Result<(), ScenarioError> {
        let actual = self.lookup(key)?;
        if actual != expected {
            return Err(ScenarioError::assertion(format!(
                "{} key '{key}' is {actual}, expected {expected}",
                self.label()
            )));
        }
        Ok(())
    }
}

/// Only `null` is empty. An empty string, array or object is a value.
const fn is_empty_value(value: &Value) -> bool {
    matches!(value, Value::Null)
}
