//! Semantic error types for procspec.
//!
//! Errors the caller might inspect or assert on are semantic enums (via
//! `thiserror`). Opaque reports (`eyre::Report`) are reserved for the
//! background-job boundary, where failures are only ever logged.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    ///
    /// This wraps errors from the layered configuration system, including
    /// file parsing errors and post-merge validation failures.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// The kind of engine object an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineObject {
    /// A deployed process definition.
    Definition,
    /// A running process instance.
    Process,
    /// An activity inside a process definition.
    Activity,
    /// An active or historic user task.
    Task,
    /// A message start event.
    Message,
}

impl std::fmt::Display for EngineObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Definition => "process definition",
            Self::Process => "process instance",
            Self::Activity => "activity",
            Self::Task => "task",
            Self::Message => "message start event",
        };
        f.write_str(label)
    }
}

/// Errors reported by an engine client.
///
/// `Clone` so that a captured error can be read back from scenario state
/// without giving up ownership.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The referenced object does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// What kind of object was looked up.
        kind: EngineObject,
        /// The identifier or key that was looked up.
        id: String,
    },

    /// The engine rejected a mutating call, e.g. a completion guard failed.
    #[error("engine rejected {operation}: {message}")]
    Rejected {
        /// The operation that was rejected.
        operation: String,
        /// The engine's explanation.
        message: String,
    },

    /// The engine could not be reached or is in an unusable state.
    #[error("engine unavailable: {message}")]
    Unavailable {
        /// A description of the failure.
        message: String,
    },
}

/// Which alias map a name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// Aliases registered for process instances.
    Process,
    /// Aliases registered for tasks.
    Task,
}

impl std::fmt::Display for AliasKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Process => f.write_str("process"),
            Self::Task => f.write_str("task"),
        }
    }
}

/// Errors that abort or annotate a running scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// An expectation did not hold.
    #[error("assertion failed: {message}")]
    AssertionFailure {
        /// A description of the mismatch.
        message: String,
    },

    /// The engine rejected an operation and the stage was not capturing.
    #[error(transparent)]
    EngineOperation(#[from] EngineError),

    /// A name was used that was never registered as an alias.
    #[error("no {kind} referenced as '{name}'")]
    AliasNotFound {
        /// The alias map that was searched.
        kind: AliasKind,
        /// The unknown name.
        name: String,
    },

    /// A name was registered twice in the same alias map.
    #[error("{kind} alias '{name}' is already registered")]
    AliasConflict {
        /// The alias map that already holds the name.
        kind: AliasKind,
        /// The duplicate name.
        name: String,
    },

    /// Pending jobs did not quiesce within the drain timeout.
    #[error("{pending} job(s) still pending after waiting {waited_ms} ms")]
    DrainTimeout {
        /// Jobs still reported as pending at the last poll.
        pending: u64,
        /// Cumulative time spent waiting between polls.
        waited_ms: u64,
    },

    /// An operation needed scenario state that has not been established.
    #[error("invalid scenario state: {message}")]
    InvalidState {
        /// What was missing.
        message: String,
    },

    /// The engine state does not allow the requested action.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// A description of the unmet precondition.
        message: String,
    },

    /// The background scheduler could not run or report on a job.
    #[error("background job failed: {message}")]
    Background {
        /// A description of the failure.
        message: String,
    },
}

impl ScenarioError {
    /// Build an [`ScenarioError::AssertionFailure`] from any message.
    pub(crate) fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailure {
            message: message.into(),
        }
    }

    /// Build an [`ScenarioError::InvalidState`] from any message.
    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

/// Top-level error type for procspec.
///
/// Aggregates the domain-specific errors so callers that do not care about
/// the distinction can use a single type.
#[derive(Debug, Error)]
pub enum ProcspecError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An engine client reported an error outside a scenario.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A scenario step failed.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

/// A specialised `Result` type for procspec operations.
pub type Result<T> = std::result::Result<T, ProcspecError>;
