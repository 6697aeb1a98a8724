//! Configuration management.
//!
//! Configuration is layered, later sources winning:
//!
//! 1. Default values
//! 2. Configuration file (`dockform.toml`, or the `--config` path)
//! 3. Environment variables (`DOCKFORM_*`, nested keys joined by `__`,
//!    e.g. `DOCKFORM_ENGINE__HOST`)
//!
//! Command-line flags are applied on top by the caller.
//!
//! ## Example Configuration File
//!
//! ```toml
//! state_file = "/var/lib/dockform/state.json"
//! values_file = "values.yaml"
//!
//! [engine]
//! host = "unix:///var/run/docker.sock"
//! api_version = "v1.43"
//! timeout = "30s"
//!
//! [logging]
//! level = "info"
//! ```

use dockform_engine::EngineConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file read when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "dockform.toml";

/// Default state file.
pub const DEFAULT_STATE_FILE: &str = "dockform-state.json";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Engine connection.
    pub engine: EngineConfig,
    /// Where external names and stack children are kept between runs.
    pub state_file: PathBuf,
    /// Config map and secret values for `valueFrom` references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values_file: Option<PathBuf>,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            values_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for dockform's own targets.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from defaults, a TOML file and the environment.
    ///
    /// A missing file is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(file).extract()
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("DOCKFORM_").split("__"))
    }

    /// Filter directive for the log subscriber.
    #[must_use]
    pub fn log_filter(&self, debug: bool) -> String {
        let level = if debug { "debug" } else { self.logging.level.as_str() };
        format!("dockform={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.state_file, PathBuf::from(DEFAULT_STATE_FILE));
        assert!(config.values_file.is_none());
        assert_eq!(config.log_filter(false), "dockform=info");
        assert_eq!(config.log_filter(true), "dockform=debug");
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                state_file = "state/records.json"
                values_file = "values.yaml"

                [engine]
                host = "tcp://10.0.0.5:2375"
                timeout = "10s"

                [logging]
                level = "warn"
                "#,
            )?;
            jail.set_env("DOCKFORM_ENGINE__TIMEOUT", "5s");

            let config = AppConfig::load(Some(Path::new("custom.toml")))?;
            assert_eq!(config.engine.host, "tcp://10.0.0.5:2375");
            assert_eq!(config.engine.timeout, "5s");
            assert_eq!(config.engine.api_version, "v1.43");
            assert_eq!(config.state_file, PathBuf::from("state/records.json"));
            assert_eq!(config.values_file, Some(PathBuf::from("values.yaml")));
            assert_eq!(config.log_filter(false), "dockform=warn");
            Ok(())
        });
    }

    #[test]
    fn test_missing_default_file() {
        Jail::expect_with(|_| {
            assert_eq!(AppConfig::load(None)?, AppConfig::default());
            Ok(())
        });
    }
}
