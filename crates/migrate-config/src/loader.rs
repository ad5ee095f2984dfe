use std::env;
use std::path::{Path, PathBuf};

use migrate_types::MigrationSettings;

use crate::error::ConfigError;
use crate::paths::Paths;

/// Builder for loading [`MigrationSettings`] from the layered precedence
/// chain in SPEC_FULL.md §7: built-in defaults, then a user config file,
/// then a project config file, then `MIGRATE_`-prefixed environment
/// variables, each layer overriding the previous.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "MIGRATE".to_string(),
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(self) -> Result<MigrationSettings, ConfigError> {
        let mut builder = config::Config::builder();

        let defaults = MigrationSettings::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        let built = builder.build()?;
        let settings: MigrationSettings = built.try_deserialize()?;
        validate(&settings)?;
        Ok(settings)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(settings: &MigrationSettings) -> Result<(), ConfigError> {
    if settings.source_service_uri.is_empty() {
        return Err(ConfigError::Validation("source_service_uri must be set".to_string()));
    }
    if settings.copy_phase_worker_count == 0 || settings.catchup_phase_worker_count == 0 {
        return Err(ConfigError::Validation("worker counts must be non-zero".to_string()));
    }
    Ok(())
}
