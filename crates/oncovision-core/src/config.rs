//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, session timing and the credential
//! backend.
//!
//! Configuration is stored at `~/.config/oncovision/config.json`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ApiError;
use crate::auth::{
    AuthSettings, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};

/// Application name used for config directory paths
const APP_NAME: &str = "oncovision";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the API lives when nothing else is configured
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";

/// Environment variable overriding `api_base_url`
pub const ENV_API_URL: &str = "ONCOVISION_API_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not find config directory")]
    NoConfigDir,

    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid API settings: {0}")]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub renewal_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            renewal_interval_secs: 4 * 60,
            request_timeout_secs: 30,
            credential_backend: CredentialBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            if !url.is_empty() {
                self.api_base_url = url;
            }
        }
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME))
    }

    pub fn auth_settings(&self) -> Result<AuthSettings, ConfigError> {
        Ok(AuthSettings::new(&self.api_base_url)?
            .with_renewal_interval(Duration::from_secs(self.renewal_interval_secs.max(1)))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs.max(1))))
    }

    /// Open the configured credential backend.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>, ConfigError> {
        Ok(match self.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::in_dir(&Self::config_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
            CredentialBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        })
    }
}
