//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! API location, token storage settings and the last used email.
//!
//! Configuration is stored at `~/.config/coinconv/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::store::{FileStore, KeyValueStore, KeyringStore, DEFAULT_STORAGE_KEY};

/// Application name used for config/data/cache directory paths
const APP_NAME: &str = "coinconv";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "COINCONV_API_URL";

/// API used by debug builds when nothing is configured
const DEV_API_URL: &str = "http://localhost:3000";

/// Hosted API used by release builds when nothing is configured
const PROD_API_URL: &str = "https://coin-converter-srih.onrender.com";

/// HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where remembered tokens are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackend {
    /// A file in the data directory
    #[default]
    File,
    /// The OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: Option<String>,
    pub storage_key: String,
    pub durable_backend: DurableBackend,
    pub remember_by_default: bool,
    pub last_email: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            durable_backend: DurableBackend::default(),
            remember_by_default: false,
            last_email: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
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

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding file-backed tokens
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Base URL: environment, then config file, then the build default.
    /// Trailing slashes are removed.
    pub fn api_base_url(&self) -> String {
        let env = std::env::var(API_URL_ENV).ok();
        Self::resolve_api_url(env.as_deref(), self.api_url.as_deref())
    }

    fn resolve_api_url(env: Option<&str>, configured: Option<&str>) -> String {
        let fallback = if cfg!(debug_assertions) {
            DEV_API_URL
        } else {
            PROD_API_URL
        };
        [env, configured]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|url| !url.is_empty())
            .unwrap_or(fallback)
            .trim_end_matches('/')
            .to_string()
    }

    /// The configured durable slot backend
    pub fn durable_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self.durable_backend {
            DurableBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            DurableBackend::Keyring => Arc::new(KeyringStore::new()),
        })
    }
}
