//! Local key-value storage for persisted settings
//!
//! `FileStore` keeps every record in one JSON object at
//! `~/.config/quizmate/store.json` with restricted permissions (0o600),
//! since the AI configuration record holds an API key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::{Error, Result};

/// Environment variable overriding the store file location
pub const STORE_PATH_ENV: &str = "QUIZMATE_STORE_PATH";

/// Generic string key-value storage
pub trait KeyValueStore: Send + Sync {
    /// Read a record. Unreadable storage is reported as `Ok(None)` by
    /// implementations that can't distinguish it from absence.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a record, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-process store, mainly for tests and embedders with their own persistence
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.records.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Store at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location, honoring `QUIZMATE_STORE_PATH`
    pub fn open_default() -> Self {
        Self::new(Self::default_path())
    }

    /// Get the store directory
    pub fn store_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quizmate")
    }

    /// Get the store file path
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::store_dir().join("store.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        if !self.path.exists() {
            return HashMap::new();
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt store file {}: {}", self.path.display(), e);
                HashMap::new()
            }),
            Err(e) => {
                tracing::warn!("Failed to read store file {}: {}", self.path.display(), e);
                HashMap::new()
            }
        }
    }

    fn save(&self, records: &HashMap<String, String>) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
                #[cfg(unix)]
                fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
            }
        }

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load().remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut records = self.load();
        records.insert(key.to_string(), value.to_string());
        self.save(&records)
            .map_err(|e| Error::Persistence(format!("{}: {}", self.path.display(), e)))
    }
}
