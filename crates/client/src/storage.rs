//! Persistent key/value storage for the client.
//!
//! Values are JSON files in a directory, by default the platform config
//! directory:
//!   - Linux: `~/.config/parley/`
//!   - macOS: `~/Library/Application Support/parley/`
//!   - Windows: `%APPDATA%\parley\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

/// A directory of JSON-encoded values.
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Storage in the platform config directory, if one exists.
    pub fn platform() -> Option<Self> {
        Some(Self::at(dirs::config_dir()?.join("parley")))
    }

    /// Storage rooted at `dir`. The directory is created on first write.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a value to persistent storage.
    ///
    /// Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value from persistent storage.
    ///
    /// Returns `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = self.load_raw(key)?;
        serde_json::from_str(&json).ok()
    }

    /// Remove a value from persistent storage.
    pub fn remove(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Check if a key exists in storage.
    pub fn exists(&self, key: &str) -> bool {
        self.load_raw(key).is_some()
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        if safe_key.is_empty() {
            return None;
        }
        Some(self.dir.join(format!("{}.json", safe_key)))
    }

    fn save_raw(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        if !self.dir.exists() && std::fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        std::fs::write(path, value).is_ok()
    }

    fn load_raw(&self, key: &str) -> Option<String> {
        let path = self.file_path(key)?;
        std::fs::read_to_string(path).ok()
    }
}
