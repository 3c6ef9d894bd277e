//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! location, request timeout, where credentials are kept, and the last used
//! username.
//!
//! Configuration is stored at `~/.config/chyrp/config.json`. The
//! `CHYRP_API_URL` and `CHYRP_CREDENTIAL_BACKEND` environment variables
//! override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{CredentialStore, FileCredentialStore, KeyringCredentialStore};

/// Application name used for config directory paths
const APP_NAME: &str = "chyrp";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

pub const ENV_API_URL: &str = "CHYRP_API_URL";
pub const ENV_CREDENTIAL_BACKEND: &str = "CHYRP_CREDENTIAL_BACKEND";

/// Where session tokens are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON file next to the config
    #[default]
    File,
    /// OS keychain
    Keyring,
}

impl FromStr for CredentialBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CredentialBackend::File),
            "keyring" | "keychain" => Ok(CredentialBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown credential backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: crate::api::client::DEFAULT_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(backend) = lookup(ENV_CREDENTIAL_BACKEND) {
            match backend.parse::<CredentialBackend>() {
                Ok(backend) => self.credential_backend = backend,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_CREDENTIAL_BACKEND),
            }
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Build the configured credential store
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::in_dir(&Self::config_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::new()),
        })
    }
}
