//! Configuration management for docacl
//!
//! Settings are merged from built-in defaults, the user's
//! `~/.config/docacl/config.toml`, the project's `docacl.toml` and
//! `docacl.local.toml`, and `DOCACL_*` environment variables. Later sources
//! win.

use anyhow::Result;
use docacl::{
    DEFAULT_MAX_VERSIONS, EngineSettings, PersistedRules, Policy, PolicyError, PolicyHandle,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main docacl configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocaclConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluation steps allowed per rule condition.
    pub evaluation_budget: u32,
    pub log_denials: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            evaluation_budget: settings.evaluation_budget,
            log_denials: settings.log_denials,
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            evaluation_budget: self.evaluation_budget,
            log_denials: self.log_denials,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Prior policy versions kept for undo.
    pub max_versions: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_versions: DEFAULT_MAX_VERSIONS,
        }
    }
}

impl HistoryConfig {
    /// Wrap `policy` in a handle keeping `max_versions` prior versions
    pub fn handle(&self, policy: Policy) -> PolicyHandle {
        PolicyHandle::with_max_versions(policy, self.max_versions)
    }
}

impl DocaclConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Load a single TOML file, without merging other sources
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values the type system cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.evaluation_budget == 0 {
            return Err(ConfigError::ValidationError(
                "engine.evaluation_budget must be greater than zero".to_string(),
            ));
        }
        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Open a handle on persisted rules with the configured engine settings
    /// and history depth
    pub fn open_policy(&self, records: &PersistedRules) -> Result<PolicyHandle, PolicyError> {
        let policy = Policy::from_records_with(records, self.engine.settings())?;
        Ok(self.history.handle(policy))
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = DocaclConfig::default();
        assert_eq!(config.engine.evaluation_budget, 10_000);
        assert!(config.engine.log_denials);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.history.max_versions, 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_settings_conversion() {
        let engine = EngineConfig {
            evaluation_budget: 50,
            log_denials: false,
        };
        assert_eq!(
            engine.settings(),
            EngineSettings {
                evaluation_budget: 50,
                log_denials: false,
            }
        );
    }

    #[test]
    fn test_history_bounds_handle() {
        let history = HistoryConfig { max_versions: 1 };
        let handle = history.handle(Policy::new());
        for _ in 0..3 {
            handle.replace(Policy::new());
        }
        assert_eq!(handle.undo_depth(), 1);
        assert!(handle.undo().is_some());
        assert!(handle.undo().is_none());

        let disabled = HistoryConfig { max_versions: 0 }.handle(Policy::new());
        disabled.replace(Policy::new());
        assert_eq!(disabled.undo_depth(), 0);
    }

    #[test]
    fn test_open_policy_applies_config() {
        let mut config = DocaclConfig::default();
        config.engine.evaluation_budget = 77;
        config.history.max_versions = 2;

        let handle = config
            .open_policy(&PersistedRules::starter())
            .expect("Failed to open starter rules");
        assert_eq!(handle.snapshot().settings().evaluation_budget, 77);
        assert_eq!(handle.version(), 1);

        for _ in 0..4 {
            handle.save(&PersistedRules::starter()).expect("Failed to save rules");
        }
        assert_eq!(handle.undo_depth(), 2);
        assert_eq!(handle.snapshot().settings().evaluation_budget, 77);
    }

    #[test]
    fn test_validation() {
        let mut config = DocaclConfig::default();
        config.engine.evaluation_budget = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = DocaclConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[engine]\nevaluation_budget = 500\n").expect("Failed to write config");

        let config = DocaclConfig::from_file(&path).expect("Failed to load config");
        assert_eq!(config.engine.evaluation_budget, 500);
        assert_eq!(config.logging.level, "info");

        fs::write(&path, "[engine\n").expect("Failed to write config");
        assert!(matches!(
            DocaclConfig::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            DocaclConfig::from_file(temp_dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DocaclConfig::default();
        let text = config.to_toml().expect("Failed to render config");
        let parsed: DocaclConfig = toml::from_str(&text).expect("Failed to parse config");
        assert_eq!(parsed, config);
    }
}
