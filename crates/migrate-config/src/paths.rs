use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::ConfigError;

/// XDG-compliant config paths, mirroring the precedence chain in spec.md
/// §7/SPEC_FULL §7: defaults -> user config file -> project config file ->
/// env vars.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("com", "MigrationPlatform", "migrate"),
        }
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().join("config.toml"))
            .ok_or(ConfigError::Xdg)
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join("migrate.toml")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
