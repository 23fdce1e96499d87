//! Configuration loader with multi-source merging

use crate::{DocaclConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "DOCACL".to_string(),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "DOCACL")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/docacl/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Files merged over the built-in defaults, lowest precedence first
    fn config_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if self.include_user_config
            && let Ok(user_config_file) = Paths::new().user_config_file()
        {
            files.push(user_config_file);
        }
        files.push(Paths::project_config_file(&self.project_dir));
        files.push(Paths::local_config_file(&self.project_dir));
        files
    }

    /// Merge defaults, config files and `<prefix>_SECTION__KEY` variables,
    /// then validate the result
    pub fn load(self) -> Result<DocaclConfig> {
        let defaults = DocaclConfig::default();
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        for file in self.config_files().into_iter().filter(|file| file.exists()) {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let docacl_config: DocaclConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        docacl_config.validate()?;

        Ok(docacl_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> DocaclConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("DOCACL_TEST_DEFAULTS")
            .without_user_config()
            .load()
            .expect("Failed to load config");

        assert_eq!(config, DocaclConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[engine]
evaluation_budget = 250
log_denials = false

[history]
max_versions = 4
"#;
        fs::write(project_dir.join("docacl.toml"), config_content)
            .expect("Failed to write config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("DOCACL_TEST_PROJECT")
            .without_user_config()
            .load()
            .expect("Failed to load config");

        assert_eq!(config.engine.evaluation_budget, 250);
        assert!(!config.engine.log_denials);
        assert_eq!(config.history.max_versions, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("docacl.toml"),
            r#"
[logging]
level = "warn"
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("docacl.local.toml"),
            r#"
[logging]
level = "debug"
"#,
        )
        .expect("Failed to write local config");

        let config = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("DOCACL_TEST_LOCAL")
            .without_user_config()
            .load()
            .expect("Failed to load config");

        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();
        fs::write(
            project_dir.join("docacl.toml"),
            "[engine]\nevaluation_budget = 0\n",
        )
        .expect("Failed to write config");

        let result = ConfigLoader::new()
            .with_project_dir(project_dir)
            .with_env_prefix("DOCACL_TEST_INVALID")
            .without_user_config()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_user_config_is_optional() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let loader = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .without_user_config();
        assert_eq!(
            loader.config_files(),
            vec![
                temp_dir.path().join("docacl.toml"),
                temp_dir.path().join("docacl.local.toml"),
            ]
        );
    }
}
