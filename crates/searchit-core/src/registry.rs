//! Tracked-object registry.
//!
//! The pairing engine only reads the registry, through [`ObjectRegistry`]:
//! which object the user selected, how many exist, and the cap. [`ObjectStore`]
//! is the concrete store the application edits (add, rename, select).

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;
use uuid::Uuid;

use crate::error::{Result, SearchItError};
use crate::storage::Storage;
use crate::types::TrackedObject;

/// Default cap on registered objects.
pub const DEFAULT_MAX_OBJECTS: usize = 3;

/// Read-only view of the registry used by the pairing engine.
pub trait ObjectRegistry: Send + Sync {
    /// The object the user picked for pairing, if any.
    fn selected_object(&self) -> Option<TrackedObject>;

    /// Number of registered objects.
    fn object_count(&self) -> usize;

    /// Maximum number of registered objects.
    fn max_objects(&self) -> usize;
}

#[derive(Debug, Default)]
struct Inner {
    objects: Vec<TrackedObject>,
    selected: Option<Uuid>,
}

/// Registry of tracked objects, optionally persisted to disk.
#[derive(Debug)]
pub struct ObjectStore {
    storage: Option<Storage>,
    max_objects: usize,
    inner: RwLock<Inner>,
}

impl ObjectStore {
    /// Open a persisted registry, loading whatever is already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored objects cannot be read.
    pub fn open(storage: Storage, max_objects: usize) -> Result<Self> {
        let objects = storage.load_objects()?;
        info!(
            count = objects.len(),
            path = %storage.data_dir().display(),
            "loaded tracked objects"
        );
        Ok(Self {
            storage: Some(storage),
            max_objects,
            inner: RwLock::new(Inner {
                objects,
                selected: None,
            }),
        })
    }

    /// A registry that lives only in memory.
    #[must_use]
    pub fn in_memory(max_objects: usize) -> Self {
        Self {
            storage: None,
            max_objects,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a new object.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::EmptyObjectName`] for a blank name,
    /// [`SearchItError::MaxObjectsReached`] when the registry is full, or a
    /// persistence error if the change cannot be saved.
    pub fn add(&self, name: &str, description: &str) -> Result<TrackedObject> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SearchItError::EmptyObjectName);
        }

        let mut inner = self.write();
        if inner.objects.len() >= self.max_objects {
            return Err(SearchItError::MaxObjectsReached {
                max: self.max_objects,
            });
        }

        let object = TrackedObject {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: description.trim().to_string(),
        };
        let mut objects = inner.objects.clone();
        objects.push(object.clone());
        self.persist(&objects)?;
        inner.objects = objects;

        info!(id = %object.id, name = %object.name, "object registered");
        Ok(object)
    }

    /// Rename and re-describe an object. Pairings already bound to it keep the old copy.
    ///
    /// # Errors
    ///
    /// Returns an error if either field is blank, the id is unknown, or the
    /// change cannot be saved.
    pub fn update(&self, id: Uuid, name: &str, description: &str) -> Result<TrackedObject> {
        let name = name.trim();
        let description = description.trim();
        if name.is_empty() {
            return Err(SearchItError::EmptyObjectName);
        }
        if description.is_empty() {
            return Err(SearchItError::EmptyObjectDescription);
        }

        let mut inner = self.write();
        let mut objects = inner.objects.clone();
        let object = objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| SearchItError::ObjectNotFound(id.to_string()))?;
        object.name = name.to_string();
        object.description = description.to_string();
        let updated = object.clone();
        self.persist(&objects)?;
        inner.objects = objects;

        info!(%id, name = %updated.name, "object updated");
        Ok(updated)
    }

    /// Mark an object as the one to pair next.
    ///
    /// # Errors
    ///
    /// Returns [`SearchItError::ObjectNotFound`] if the id is unknown.
    pub fn select(&self, id: Uuid) -> Result<TrackedObject> {
        let mut inner = self.write();
        let object = inner
            .objects
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| SearchItError::ObjectNotFound(id.to_string()))?;
        inner.selected = Some(id);
        Ok(object)
    }

    /// Forget the current selection.
    pub fn clear_selection(&self) {
        self.write().selected = None;
    }

    /// All registered objects, in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<TrackedObject> {
        self.read().objects.clone()
    }

    /// Look up one object.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<TrackedObject> {
        self.read().objects.iter().find(|o| o.id == id).cloned()
    }

    /// Save `objects`; callers commit them to memory only on success.
    fn persist(&self, objects: &[TrackedObject]) -> Result<()> {
        match &self.storage {
            Some(storage) => storage.save_objects(objects),
            None => Ok(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectRegistry for ObjectStore {
    fn selected_object(&self) -> Option<TrackedObject> {
        let inner = self.read();
        let id = inner.selected?;
        inner.objects.iter().find(|o| o.id == id).cloned()
    }

    fn object_count(&self) -> usize {
        self.read().objects.len()
    }

    fn max_objects(&self) -> usize {
        self.max_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_trims_and_counts() {
        let store = ObjectStore::in_memory(DEFAULT_MAX_OBJECTS);
        let keys = store.add("  Keys ", " hallway ").unwrap();
        assert_eq!(keys.name, "Keys");
        assert_eq!(keys.description, "hallway");
        assert_eq!(store.object_count(), 1);
        assert_eq!(store.max_objects(), 3);
    }

    #[test]
    fn test_blank_name_rejected() {
        let store = ObjectStore::in_memory(DEFAULT_MAX_OBJECTS);
        assert!(matches!(
            store.add("   ", "desc"),
            Err(SearchItError::EmptyObjectName)
        ));
        assert_eq!(store.object_count(), 0);
    }

    #[test]
    fn test_cap_is_enforced() {
        let store = ObjectStore::in_memory(DEFAULT_MAX_OBJECTS);
        for name in ["Keys", "Wallet", "Remote"] {
            store.add(name, "").unwrap();
        }
        let err = store.add("Glasses", "").unwrap_err();
        assert!(matches!(err, SearchItError::MaxObjectsReached { max: 3 }));
        assert_eq!(store.object_count(), 3);
    }

    #[test]
    fn test_selection() {
        let store = ObjectStore::in_memory(DEFAULT_MAX_OBJECTS);
        assert!(store.selected_object().is_none());

        let wallet = store.add("Wallet", "").unwrap();
        store.select(wallet.id).unwrap();
        assert_eq!(store.selected_object(), Some(wallet));

        store.clear_selection();
        assert!(store.selected_object().is_none());

        assert!(matches!(
            store.select(Uuid::now_v7()),
            Err(SearchItError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_update_requires_both_fields() {
        let store = ObjectStore::in_memory(DEFAULT_MAX_OBJECTS);
        let keys = store.add("Keys", "hallway").unwrap();

        assert!(matches!(
            store.update(keys.id, "Keys", " "),
            Err(SearchItError::EmptyObjectDescription)
        ));

        let renamed = store.update(keys.id, "House keys", "bowl").unwrap();
        assert_eq!(renamed.name, "House keys");
        assert_eq!(store.get(keys.id), Some(renamed));
    }

    #[test]
    fn test_persisted_store_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(Storage::new(dir.path()), DEFAULT_MAX_OBJECTS).unwrap();
        let keys = store.add("Keys", "hallway").unwrap();
        drop(store);

        let reopened = ObjectStore::open(Storage::new(dir.path()), DEFAULT_MAX_OBJECTS).unwrap();
        assert_eq!(reopened.list(), vec![keys]);
        // Selection is not persisted.
        assert!(reopened.selected_object().is_none());
    }

    #[test]
    fn test_failed_save_leaves_registry_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(Storage::new(dir.path()), DEFAULT_MAX_OBJECTS).unwrap();
        let keys = store.add("Keys", "hallway").unwrap();
        store.select(keys.id).unwrap();

        // The data directory turns into a regular file, so every save fails.
        std::fs::remove_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path(), b"not a directory").unwrap();

        assert!(store.add("Wallet", "jacket").is_err());
        assert_eq!(store.object_count(), 1);

        assert!(store.update(keys.id, "Car keys", "bowl").is_err());
        assert_eq!(store.get(keys.id), Some(keys.clone()));
        assert_eq!(store.selected_object(), Some(keys));

        std::fs::remove_file(dir.path()).unwrap();
    }
}
