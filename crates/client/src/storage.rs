//! Persistent key/value storage.
//!
//! Values are JSON files in one directory, by default the platform config
//! directory:
//!   - Linux: `~/.config/attendly/`
//!   - macOS: `~/Library/Application Support/attendly/`
//!   - Windows: `%APPDATA%\attendly\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    /// Storage under the platform config directory, if there is one.
    pub fn config_dir() -> Option<Self> {
        Some(Self::at(dirs::config_dir()?.join("attendly")))
    }

    /// Storage rooted at an explicit directory (created on first write).
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save a value. Returns `true` if the operation succeeded.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.save_raw(key, &json),
            Err(_) => false,
        }
    }

    /// Load a value. `None` if the key doesn't exist or deserialization fails.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        serde_json::from_str(&json).ok()
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_path(key));
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).is_file()
    }

    fn save_raw(&self, key: &str, value: &str) -> bool {
        if !self.dir.exists() && std::fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        std::fs::write(self.file_path(key), value).is_ok()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{safe_key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> Storage {
        Storage::at(std::env::temp_dir().join(format!("attendly-storage-{}", uuid::Uuid::new_v4())))
    }

    #[test]
    fn save_load_remove() {
        let storage = scratch();
        assert!(!storage.exists("attendly_token"));
        assert_eq!(storage.load::<String>("attendly_token"), None);

        assert!(storage.save("attendly_token", &"tok123"));
        assert!(storage.exists("attendly_token"));
        assert_eq!(
            storage.load::<String>("attendly_token").as_deref(),
            Some("tok123")
        );

        storage.remove("attendly_token");
        assert!(!storage.exists("attendly_token"));
        let _ = std::fs::remove_dir_all(storage.dir());
    }

    #[test]
    fn keys_are_sanitized() {
        let storage = scratch();
        assert!(storage.save("session/user:1", &42u32));
        assert!(storage.dir().join("session_user_1.json").is_file());
        assert_eq!(storage.load::<u32>("session/user:1"), Some(42));
        let _ = std::fs::remove_dir_all(storage.dir());
    }
}
