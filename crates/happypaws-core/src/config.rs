//! Application configuration management.
//!
//! Configuration is stored at `~/.config/happypaws/config.json`; every field
//! is optional and falls back to a built-in default. `HAPPYPAWS_API_URL` and
//! `HAPPYPAWS_STORAGE` override the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{FileStorage, KeyringStorage, MemoryStorage, TokenStorage};

/// Application name used for config/data directory paths
const APP_NAME: &str = "happypaws";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_API_BASE_URL: &str = "https://happy-paws-backend.vercel.app/api/happy-paws";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timeout for the token refresh call. Shorter than a normal request so a
/// hung refresh does not hold up every request queued behind it.
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

const API_URL_ENV: &str = "HAPPYPAWS_API_URL";
const STORAGE_ENV: &str = "HAPPYPAWS_STORAGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Some(StorageBackend::File),
            "keyring" => Some(StorageBackend::Keyring),
            "memory" => Some(StorageBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub refresh_timeout_secs: Option<u64>,
    pub storage: Option<StorageBackend>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where file-backed session pieces live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join("session"))
    }

    pub fn api_base_url(&self) -> String {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(
            self.refresh_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REFRESH_TIMEOUT_SECS),
        )
    }

    pub fn storage_backend(&self) -> StorageBackend {
        if let Ok(value) = std::env::var(STORAGE_ENV) {
            match StorageBackend::parse(&value) {
                Some(backend) => return backend,
                None => warn!(value = %value, "Unknown storage backend, ignoring override"),
            }
        }
        self.storage.unwrap_or_default()
    }

    /// Build the token storage selected by this configuration.
    pub fn open_storage(&self) -> Result<Arc<dyn TokenStorage>> {
        let storage: Arc<dyn TokenStorage> = match self.storage_backend() {
            StorageBackend::File => Arc::new(FileStorage::new(self.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStorage::new()),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(15));
        assert_eq!(config.storage.unwrap_or_default(), StorageBackend::File);
    }

    #[test]
    fn test_zero_timeout_falls_back_to_default() {
        let config = Config {
            request_timeout_secs: Some(0),
            refresh_timeout_secs: Some(5),
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_config_file() {
        let json = r#"{"api_base_url":"http://localhost:5000/api/happy-paws","storage":"keyring","last_email":"a@x.com"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.storage, Some(StorageBackend::Keyring));
        assert_eq!(config.last_email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(StorageBackend::parse(" Memory "), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("file"), Some(StorageBackend::File));
        assert_eq!(StorageBackend::parse("cloud"), None);
    }
}
