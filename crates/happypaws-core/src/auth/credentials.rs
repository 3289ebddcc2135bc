use anyhow::{Context, Result};
use keyring::Entry;

use super::storage::{StorageKey, TokenStorage};

const SERVICE_NAME: &str = "happypaws";

/// Session pieces kept in the OS keychain, one entry per key.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, key: StorageKey) -> Result<Entry> {
        Entry::new(&self.service, key.as_str()).context("Failed to create keyring entry")
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStorage for KeyringStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }
}
