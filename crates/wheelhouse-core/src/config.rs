//! Configuration management for Wheelhouse.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`WHEELHOUSE_<SECTION>__<FIELD>`)
//! 2. Config file (`wheelhouse.toml`, or another prefix)
//! 3. Defaults

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file prefix.
pub const DEFAULT_CONFIG_PREFIX: &str = "wheelhouse";

/// Orchestration engine options.
///
/// Loaded from the `[engine]` section or `WHEELHOUSE_ENGINE__` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Failed attempts before a step fails permanently.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Notify immediately on critical deviations.
    #[serde(default = "default_true")]
    pub auto_escalate: bool,

    /// Recent decisions and deviations carried in each context snapshot.
    #[serde(default = "default_context_window")]
    pub context_window_size: usize,

    /// Upcoming steps listed in each context snapshot.
    #[serde(default = "default_upcoming_window")]
    pub upcoming_window_size: usize,

    /// Run the reflexion checkpoint after successful steps.
    #[serde(default = "default_true")]
    pub enable_reflexion: bool,

    /// Tick period of the autonomous loop, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub autonomous_interval_ms: u64,

    /// Halt the autonomous loop on the first step failure.
    #[serde(default = "default_true")]
    pub pause_on_error: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_context_window() -> usize {
    5
}

fn default_upcoming_window() -> usize {
    3
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            auto_escalate: true,
            context_window_size: default_context_window(),
            upcoming_window_size: default_upcoming_window(),
            enable_reflexion: true,
            autonomous_interval_ms: default_interval_ms(),
            pause_on_error: true,
        }
    }
}

impl EngineConfig {
    /// Load the `[engine]` section from `<file_prefix>.toml` and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        let config: Self = load_section(file_prefix, "engine")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.autonomous_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "autonomous_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn autonomous_interval(&self) -> Duration {
        Duration::from_millis(self.autonomous_interval_ms.max(1))
    }
}

/// Where the file logbook keeps its records.
///
/// Loaded from the `[logbook]` section or `WHEELHOUSE_LOGBOOK__` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogbookConfig {
    #[serde(default = "default_logbook_dir")]
    pub dir: String,
}

fn default_logbook_dir() -> String {
    "./logbook".to_string()
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            dir: default_logbook_dir(),
        }
    }
}

impl LogbookConfig {
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        load_section(file_prefix, "logbook")
    }
}

/// Read one section, falling back to defaults when it is absent entirely.
fn load_section<T>(file_prefix: &str, section: &str) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("WHEELHOUSE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section not found, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.auto_escalate);
        assert_eq!(config.context_window_size, 5);
        assert_eq!(config.upcoming_window_size, 3);
        assert!(config.enable_reflexion);
        assert_eq!(config.autonomous_interval(), Duration::from_millis(2000));
        assert!(config.pause_on_error);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[engine]\nmax_retries = 2\npause_on_error = false\n\n[logbook]\ndir = \"/tmp/lb\"\n",
        )
        .unwrap();
        let prefix = dir.path().join("custom");
        let prefix = prefix.to_str().unwrap();

        let engine = EngineConfig::load(prefix).unwrap();
        assert_eq!(engine.max_retries, 2);
        assert!(!engine.pause_on_error);
        assert_eq!(engine.context_window_size, 5);

        let logbook = LogbookConfig::load(prefix).unwrap();
        assert_eq!(logbook.dir, "/tmp/lb");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = EngineConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = EngineConfig {
            autonomous_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
