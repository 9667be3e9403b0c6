//! Server configuration
//!
//! Loaded from a TOML file; every field has a default so an absent
//! file means a working local server.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use palaver_net::DEFAULT_PORT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine a home directory")]
    NoProjectDirs,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port to listen on
    pub port: u16,
    /// SQLite file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the default location if it
    /// exists, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = default_config_path()?;
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Resolve the database file, creating the data directory when the
    /// platform default is used
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(p) => Ok(p.clone()),
            None => {
                let dirs = project_dirs()?;
                let data_dir = dirs.data_dir();
                fs::create_dir_all(data_dir)?;
                Ok(data_dir.join("palaver.db"))
            }
        }
    }
}

fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(project_dirs()?.config_dir().join("config.toml"))
}

fn project_dirs() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("dev", "palaver", "palaver").ok_or(ConfigError::NoProjectDirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("port = 9000").unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9001\ndatabase_path = \"/tmp/palaver-test.db\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/tmp/palaver-test.db"))
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }
}
