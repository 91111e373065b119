//! Configuration data types for procspec.

use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

/// What a drain does when jobs are still pending at the timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Log a warning and let the scenario continue.
    #[default]
    Continue,
    /// Fail the step with `ScenarioError::DrainTimeout`.
    Fail,
}

/// Job drain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Upper bound on the cumulative wait between polls, in milliseconds.
    pub timeout_ms: u64,

    /// Pause between polls of the pending-job count, in milliseconds.
    pub poll_interval_ms: u64,

    /// Behaviour when the timeout elapses with jobs still pending.
    pub on_timeout: TimeoutPolicy,
}

impl DrainConfig {
    /// The drain timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The poll interval as a [`Duration`].
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            poll_interval_ms: 25,
            on_timeout: TimeoutPolicy::Continue,
        }
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Number of worker threads serving background jobs.
    pub workers: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { workers: 10 }
    }
}

/// Root scenario configuration.
///
/// Loaded from defaults, a configuration file, and environment variables,
/// in that order of precedence (lowest first).
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `PROCSPEC_CONFIG_PATH` environment variable
/// 2. `.procspec.toml` in the current working directory
/// 3. `.procspec.toml` in the home directory
/// 4. `~/.config/procspec/config.toml` (XDG default)
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "PROCSPEC",
    post_merge_hook,
    discovery(
        app_name = "procspec",
        env_var = "PROCSPEC_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".procspec.toml",
        config_cli_long = "config",
        config_cli_visible = false,
    )
)]
pub struct ScenarioConfig {
    /// Capture engine errors raised in When stages instead of failing the step.
    #[serde(default = "default_capture_engine_errors")]
    pub capture_engine_errors: bool,

    /// Reason passed to the engine when teardown deletes process instances.
    #[serde(default = "default_teardown_reason")]
    pub teardown_reason: String,

    /// Job drain configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub drain: DrainConfig,

    /// Background scheduler configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub background: BackgroundConfig,
}

const fn default_capture_engine_errors() -> bool {
    true
}

fn default_teardown_reason() -> String {
    String::from("cleanup")
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            capture_engine_errors: default_capture_engine_errors(),
            teardown_reason: default_teardown_reason(),
            drain: DrainConfig::default(),
            background: BackgroundConfig::default(),
        }
    }
}

impl PostMergeHook for ScenarioConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        if self.drain.poll_interval_ms == 0 {
            return Err(validation_error(
                "drain.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.background.workers == 0 {
            return Err(validation_error("background.workers", "must be at least 1"));
        }
        if self.teardown_reason.trim().is_empty() {
            self.teardown_reason = default_teardown_reason();
        }
        Ok(())
    }
}

fn validation_error(key: &str, message: &str) -> std::sync::Arc<OrthoError> {
    std::sync::Arc::new(OrthoError::Validation {
        key: key.to_owned(),
        message: message.to_owned(),
    })
}
