use std::sync::RwLock;

use dit_types::{Fingerprint, Manifest};

use crate::error::{StoreError, StoreResult};
use crate::traits::ManifestStore;

/// In-memory, `BTreeMap`-based manifest store.
///
/// Intended for tests and embedding. Entries live behind a `RwLock`; every
/// call commits immediately.
pub struct InMemoryManifestStore {
    entries: RwLock<Manifest>,
}

impl InMemoryManifestStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::from_manifest(Manifest::new())
    }

    /// Create a store pre-populated with `manifest`.
    pub fn from_manifest(manifest: Manifest) -> Self {
        Self {
            entries: RwLock::new(manifest),
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove all entries.
    pub fn clear(&self) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .clear();
        Ok(())
    }
}

impl Default for InMemoryManifestStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestStore for InMemoryManifestStore {
    fn list_all(&self) -> StoreResult<Manifest> {
        let map = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.clone())
    }

    fn write(&self, path: &str, fingerprint: &Fingerprint) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        map.insert(path.to_string(), *fingerprint);
        Ok(())
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        map.remove(path);
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<Fingerprint>> {
        let map = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(path).copied())
    }
}

impl std::fmt::Debug for InMemoryManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryManifestStore")
            .field("entry_count", &self.len().ok())
            .finish()
    }
}
