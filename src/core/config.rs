//! On-disk configuration.
//!
//! A small TOML file under the platform config directory. Every field is
//! optional; a missing file yields the defaults.

use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::core::client::OPENROUTER_BASE_URL;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Override for the gateway base URL (testing, proxies).
    pub base_url: Option<String>,
    /// Model id assigned to newly created characters.
    pub default_model: Option<String>,
    /// Override for the chat-store location.
    pub data_file: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from_path(&Self::config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
                path: config_path.to_path_buf(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source,
            })
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn StdError>> {
        self.save_to_path(&Self::config_path())
    }

    pub(crate) fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn StdError>> {
        let parent = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty());

        if let Some(dir) = parent {
            fs::create_dir_all(dir)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };

        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(config_path)
            .map_err(|err| -> Box<dyn StdError> { Box::new(err) })?;
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(OPENROUTER_BASE_URL)
    }

    /// Path of the chat store, honoring the `data_file` override.
    pub fn data_path(&self) -> PathBuf {
        if let Some(path) = &self.data_file {
            return path.clone();
        }
        let proj_dirs = ProjectDirs::from("org", "permacommons", "dramatis")
            .expect("Failed to determine data directory");
        proj_dirs.data_dir().join("chats.json")
    }

    fn config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "dramatis")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }
}
