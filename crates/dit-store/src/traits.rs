use dit_types::{Fingerprint, Manifest};

use crate::error::StoreResult;

/// Persisted path → fingerprint mapping consumed by the sync engine.
///
/// Implementations must satisfy these invariants:
/// - Paths are unique: `write` on an existing path replaces its fingerprint.
/// - Each call commits immediately and independently.
/// - `delete` of an absent path succeeds and changes nothing.
pub trait ManifestStore: Send + Sync {
    /// Snapshot of every entry in the store.
    fn list_all(&self) -> StoreResult<Manifest>;

    /// Insert or replace the fingerprint recorded for `path`.
    fn write(&self, path: &str, fingerprint: &Fingerprint) -> StoreResult<()>;

    /// Remove the entry for `path`, if any.
    fn delete(&self, path: &str) -> StoreResult<()>;

    /// Look up a single entry.
    ///
    /// Default implementation scans a full snapshot. Backends may override.
    fn get(&self, path: &str) -> StoreResult<Option<Fingerprint>> {
        Ok(self.list_all()?.get(path).copied())
    }
}
