use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use universe::{resolve_universe_paths, StartupError, UniversePaths};

const RUN_CONFIG_ENV_VAR: &str = "DIGWORLD_CONFIG";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("read {var}: {source}")]
    ConfigEnv {
        var: &'static str,
        #[source]
        source: std::env::VarError,
    },
    #[error("read run config '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// `location` is empty or ` at <json path>`.
    #[error("parse run config{location}: {source}")]
    ConfigParse {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Headless run settings, read from the JSON file named by
/// `DIGWORLD_CONFIG`. Missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct RunConfig {
    pub(crate) universe: String,
    pub(crate) ticks: u32,
    pub(crate) autopilot_speed: i32,
    pub(crate) save_on_exit: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            universe: "demo".to_string(),
            ticks: 600,
            autopilot_speed: 4,
            save_on_exit: true,
        }
    }
}

pub(crate) struct AppWiring {
    pub(crate) paths: UniversePaths,
    pub(crate) config: RunConfig,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Digworld Startup ===");

    let paths = resolve_universe_paths()?;
    let config = load_run_config()?;
    info!(
        root = %paths.root.display(),
        universe = %config.universe,
        ticks = config.ticks,
        "run_config_loaded"
    );

    Ok(AppWiring { paths, config })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn load_run_config() -> Result<RunConfig, BootstrapError> {
    match std::env::var(RUN_CONFIG_ENV_VAR) {
        Ok(path) => read_run_config(Path::new(&path)),
        Err(std::env::VarError::NotPresent) => Ok(RunConfig::default()),
        Err(source) => Err(BootstrapError::ConfigEnv {
            var: RUN_CONFIG_ENV_VAR,
            source,
        }),
    }
}

pub(crate) fn read_run_config(path: &Path) -> Result<RunConfig, BootstrapError> {
    let raw = fs::read_to_string(path).map_err(|source| BootstrapError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_run_config(&raw)
}

pub(crate) fn parse_run_config(raw: &str) -> Result<RunConfig, BootstrapError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, RunConfig>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let location = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!(" at {path}")
        };
        BootstrapError::ConfigParse {
            location,
            source: error.into_inner(),
        }
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(parse_run_config("{}").expect("config"), RunConfig::default());
    }

    #[test]
    fn partial_config_overrides_only_given_fields() {
        let config = parse_run_config(r#"{"ticks": 30, "universe": "caves"}"#).expect("config");
        assert_eq!(config.ticks, 30);
        assert_eq!(config.universe, "caves");
        assert_eq!(config.autopilot_speed, 4);
        assert!(config.save_on_exit);
    }

    #[test]
    fn type_errors_report_the_field_path() {
        let error = parse_run_config(r#"{"ticks": "many"}"#).expect_err("bad ticks");
        assert!(
            matches!(&error, BootstrapError::ConfigParse { location, .. } if location == " at ticks"),
            "{error:?}"
        );
        assert!(error.to_string().starts_with("parse run config at ticks:"), "{error}");
    }

    #[test]
    fn malformed_json_has_no_field_path() {
        let error = parse_run_config("{").expect_err("truncated");
        assert!(error.to_string().starts_with("parse run config: "), "{error}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = parse_run_config(r#"{"tick": 5}"#).expect_err("unknown field");
        assert!(error.to_string().contains("tick"), "{error}");
    }

    #[test]
    fn startup_errors_pass_through_unchanged() {
        let startup = StartupError::InvalidEnvRoot {
            path: PathBuf::from("/nowhere"),
        };
        let message = startup.to_string();
        let error = BootstrapError::from(startup);
        assert!(matches!(error, BootstrapError::Startup(StartupError::InvalidEnvRoot { .. })));
        assert_eq!(error.to_string(), message);
    }

    #[test]
    fn reads_config_from_file() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("run.json");
        fs::write(&path, r#"{"save_on_exit": false}"#).expect("write");
        let config = read_run_config(&path).expect("config");
        assert!(!config.save_on_exit);

        let missing_path = temp.path().join("missing.json");
        let missing = read_run_config(&missing_path).expect_err("missing");
        assert!(
            matches!(&missing, BootstrapError::ConfigRead { path, .. } if *path == missing_path),
            "{missing:?}"
        );
        assert!(missing.to_string().starts_with("read run config"), "{missing}");
    }
}
