//! Persistent storage for the object registry.
//!
//! Objects are kept in a single JSON file, rewritten in full on every change.

use std::path::{Path, PathBuf};

use crate::error::{Result, SearchItError};
use crate::types::TrackedObject;

const OBJECTS_FILE: &str = "objects.json";

/// Storage backend for Search It data.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Storage in the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn default_location() -> Result<Self> {
        default_data_dir().map(Self::new)
    }

    /// Directory holding the data files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load all tracked objects. A missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_objects(&self) -> Result<Vec<TrackedObject>> {
        let path = self.objects_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            SearchItError::PersistenceError(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Replace the stored objects.
    ///
    /// Writes to a temporary file first so a crash never leaves a truncated registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_objects(&self, objects: &[TrackedObject]) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let content = serde_json::to_string_pretty(objects).map_err(|e| {
            SearchItError::PersistenceError(format!("Failed to serialize objects: {e}"))
        })?;

        let path = self.objects_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn objects_path(&self) -> PathBuf {
        self.data_dir.join(OBJECTS_FILE)
    }
}

/// Platform data directory for Search It (`~/.local/share/searchit` on Linux).
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    directories::ProjectDirs::from("", "", "searchit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| SearchItError::PersistenceError("Cannot determine data directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load_objects().unwrap().is_empty());
    }

    #[test]
    fn test_objects_persist() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().join("nested"));

        let objects = vec![TrackedObject {
            id: Uuid::now_v7(),
            name: "Wallet".into(),
            description: "Jacket pocket".into(),
        }];
        storage.save_objects(&objects).unwrap();

        assert_eq!(storage.load_objects().unwrap(), objects);
        assert!(!dir.path().join("nested/objects.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(OBJECTS_FILE), "{not json").unwrap();

        let err = Storage::new(dir.path()).load_objects().unwrap_err();
        assert!(matches!(err, SearchItError::PersistenceError(_)));
    }
}
