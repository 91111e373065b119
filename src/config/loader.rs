//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! environment variables. Layers are composed manually with
//! `MergeComposer` so that typed environment values fail fast instead of
//! being silently ignored, and so that tests can substitute the process
//! environment through `mockable::Env`.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.
//! `PROCSPEC_DRAIN_TIMEOUT_MS=soon`) return an error immediately. String
//! fields such as `PROCSPEC_TEARDOWN_REASON` are always accepted.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::ScenarioConfig;
use crate::error::{ConfigError, Result};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "PROCSPEC_CONFIG_PATH";

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`).
    Bool,
    /// Unsigned 64-bit integer.
    U64,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name.
    env_var: &'static str,
    /// The JSON path segments the value is written to.
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "PROCSPEC_CAPTURE_ENGINE_ERRORS",
        path: &["capture_engine_errors"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "PROCSPEC_TEARDOWN_REASON",
        path: &["teardown_reason"],
        var_type: EnvVarType::String,
    },
    // Drain fields
    EnvVarSpec {
        env_var: "PROCSPEC_DRAIN_TIMEOUT_MS",
        path: &["drain", "timeout_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PROCSPEC_DRAIN_POLL_INTERVAL_MS",
        path: &["drain", "poll_interval_ms"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "PROCSPEC_DRAIN_ON_TIMEOUT",
        path: &["drain", "on_timeout"],
        var_type: EnvVarType::String,
    },
    // Background fields
    EnvVarSpec {
        env_var: "PROCSPEC_BACKGROUND_WORKERS",
        path: &["background", "workers"],
        var_type: EnvVarType::U64,
    },
];

/// Returns the environment variable names recognised by the config loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Read a TOML configuration file and push it to the composer.
fn load_config_file(path: &Utf8Path, composer: &mut MergeComposer) -> Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.to_path_buf()));
    Ok(())
}

/// Pick the configuration file to load, if any.
///
/// An explicit path wins, then `PROCSPEC_CONFIG_PATH`, then the first
/// existing discovery candidate (`.procspec.toml`, then
/// `~/.config/procspec/config.toml`). Explicitly named files must exist.
fn resolve_config_path<E: mockable::Env>(
    explicit_path: Option<&Utf8Path>,
    env: &E,
) -> Result<Option<Utf8PathBuf>> {
    let named = explicit_path
        .map(Utf8Path::to_path_buf)
        .or_else(|| env.string(CONFIG_PATH_ENV).map(Utf8PathBuf::from));

    if let Some(path) = named {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.into_std_path_buf(),
            }
            .into());
        }
        return Ok(Some(path));
    }

    let discovery = ConfigDiscovery::builder("procspec")
        .config_file_name("config.toml")
        .dotfile_name(".procspec.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|candidate| candidate.exists())
        .find_map(|candidate| Utf8PathBuf::try_from(candidate).ok()))
}

/// Load configuration with full layer precedence.
///
/// Sources, lowest to highest precedence:
/// 1. Defaults from [`ScenarioConfig::default`]
/// 2. The configuration file (see [`CONFIG_PATH_ENV`] and discovery)
/// 3. `PROCSPEC_*` environment variables, read through `env`
///
/// # Errors
///
/// Returns `ConfigError` if a named file is missing, a file is malformed,
/// a typed environment variable cannot be parsed, or post-merge validation
/// rejects the result.
pub fn load_config<E: mockable::Env>(
    explicit_path: Option<&Utf8Path>,
    env: &E,
) -> Result<ScenarioConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(ScenarioConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = resolve_config_path(explicit_path, env)? {
        tracing::debug!(path = %path, "loading configuration file");
        load_config_file(&path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let config =
        ScenarioConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    Ok(config)
}

/// Collect `PROCSPEC_*` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed variable has an
/// unparseable value.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();
    for spec in ENV_VAR_SPECS {
        if let Some(raw) = env.string(spec.env_var) {
            insert_at_path(&mut root, spec.path, spec.parse(raw)?);
        }
    }
    Ok(if root.is_empty() {
        Value::Null
    } else {
        Value::Object(root)
    })
}

impl EnvVarSpec {
    /// Convert a raw variable value into its JSON form.
    fn parse(&self, raw: String) -> std::result::Result<Value, ConfigError> {
        let invalid = |expected: &str, raw: &str| ConfigError::InvalidValue {
            field: self.env_var.to_owned(),
            reason: format!("expected {expected}, got '{raw}'"),
        };
        match self.var_type {
            EnvVarType::String => Ok(Value::String(raw)),
            EnvVarType::Bool => raw
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| invalid("bool (true/false)", &raw)),
            EnvVarType::U64 => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|_| invalid("unsigned integer", &raw)),
        }
    }
}

/// Write `value` at a nested `path`, creating sections on the way.
fn insert_at_path(target: &mut Map<String, Value>, path: &[&str], value: Value) {
    match path {
        [] => {}
        [field] => {
            target.insert((*field).to_owned(), value);
        }
        [section, rest @ ..] => {
            let child = target
                .entry((*section).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(section_map) = child {
                insert_at_path(section_map, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mockable::MockEnv;
    use rstest::rstest;

    use super::*;
    use crate::config::TimeoutPolicy;
    use crate::error::ProcspecError;

    /// A mock environment holding exactly `vars`.
    fn env_with(vars: &[(&'static str, &'static str)]) -> MockEnv {
        let owned: Vec<(&'static str, &'static str)> = vars.to_vec();
        let mut env = MockEnv::new();
        env.expect_string().returning(move |key| {
            owned
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value).to_owned())
        });
        env
    }

    #[rstest]
    fn insert_at_path_creates_nested_objects() {
        let mut root = Map::new();
        insert_at_path(&mut root, &["drain", "timeout_ms"], Value::from(10_u64));
        insert_at_path(&mut root, &["drain", "on_timeout"], Value::from("fail"));

        assert_eq!(
            Value::Object(root),
            serde_json::json!({ "drain": { "timeout_ms": 10, "on_timeout": "fail" } })
        );
    }

    #[rstest]
    fn collect_env_vars_is_null_without_variables() {
        let value = collect_env_vars(&env_with(&[])).expect("collection should succeed");
        assert!(value.is_null());
    }

    #[rstest]
    fn env_layer_overrides_defaults() {
        let env = env_with(&[
            ("PROCSPEC_DRAIN_TIMEOUT_MS", "500"),
            ("PROCSPEC_DRAIN_ON_TIMEOUT", "fail"),
            ("PROCSPEC_CAPTURE_ENGINE_ERRORS", "false"),
            ("PROCSPEC_BACKGROUND_WORKERS", "3"),
        ]);

        let values = collect_env_vars(&env).expect("collection should succeed");
        let mut composer = MergeComposer::new();
        composer.push_defaults(
            serde_json::to_value(ScenarioConfig::default()).expect("defaults serialise"),
        );
        composer.push_environment(values);
        let config =
            ScenarioConfig::merge_from_layers(composer.layers()).expect("merge should succeed");

        assert_eq!(config.drain.timeout_ms, 500);
        assert_eq!(config.drain.poll_interval_ms, 25);
        assert_eq!(config.drain.on_timeout, TimeoutPolicy::Fail);
        assert!(!config.capture_engine_errors);
        assert_eq!(config.background.workers, 3);
    }

    #[rstest]
    #[case("PROCSPEC_DRAIN_TIMEOUT_MS", "soon", "expected unsigned integer, got 'soon'")]
    #[case(
        "PROCSPEC_CAPTURE_ENGINE_ERRORS",
        "maybe",
        "expected bool (true/false), got 'maybe'"
    )]
    fn typed_env_values_fail_fast(
        #[case] name: &'static str,
        #[case] value: &'static str,
        #[case] expected_reason: &str,
    ) {
        let error = collect_env_vars(&env_with(&[(name, value)]))
            .expect_err("invalid typed value should fail");

        match error {
            ProcspecError::Config(ConfigError::InvalidValue { field, reason }) => {
                assert_eq!(field, name);
                assert_eq!(reason, expected_reason);
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[rstest]
    fn named_file_must_exist() {
        let env = env_with(&[(CONFIG_PATH_ENV, "/nonexistent/procspec.toml")]);

        let error = resolve_config_path(None, &env).expect_err("missing file should fail");

        assert!(matches!(
            error,
            ProcspecError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
