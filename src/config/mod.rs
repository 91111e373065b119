//! Configuration system for procspec.
//!
//! Scenario behaviour (drain timing, error capture, teardown, background
//! pool size) is configured through layered sources merged by the
//! `ortho_config` crate: defaults, then a configuration file, then
//! `PROCSPEC_*` environment variables.
//!
//! # Example Configuration
//!
//! ```toml
//! capture_engine_errors = true
//! teardown_reason = "cleanup"
//!
//! [drain]
//! timeout_ms = 60000
//! poll_interval_ms = 25
//! on_timeout = "continue"
//!
//! [background]
//! workers = 10
//! ```

mod loader;
mod types;


pub use loader::{CONFIG_PATH_ENV, env_var_names, load_config};
pub use types::{BackgroundConfig, DrainConfig, ScenarioConfig, TimeoutPolicy};
