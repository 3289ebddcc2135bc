use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

/// The three durable slots a session is persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StorageKey {
    pub const ALL: [StorageKey; 3] = [
        StorageKey::AccessToken,
        StorageKey::RefreshToken,
        StorageKey::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => "accessToken",
            StorageKey::RefreshToken => "refreshToken",
            StorageKey::User => "user",
        }
    }
}

/// String-keyed durable storage for session pieces.
///
/// Removing a key that does not exist is not an error.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>>;
    fn set(&self, key: StorageKey, value: &str) -> Result<()>;
    fn remove(&self, key: StorageKey) -> Result<()>;
}

/// One file per key inside a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, key: StorageKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {}", key.as_str()))?;
        Ok(Some(contents))
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).context("Failed to create session directory")?;
        std::fs::write(self.path(key), value)
            .with_context(|| format!("Failed to write session file: {}", key.as_str()))?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove session file: {}", key.as_str()))?;
        }
        Ok(())
    }
}

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn temp_dir(label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("happypaws-{}-{}-{}", label, std::process::id(), n))
}
