//! Manifest storage for dit.
//!
//! The manifest records, per relative file path, the fingerprint that was
//! current when the file was last deployed. The sync engine reads it once at
//! the start of a run and then commits one `write` or `delete` per changed
//! path as it goes.
//!
//! # Storage Backends
//!
//! All backends implement the [`ManifestStore`] trait:
//!
//! - [`InMemoryManifestStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`LogManifestStore`] -- append-only, CRC-framed log on disk
//!
//! # Design Rules
//!
//! 1. Every `write`/`delete` commits on its own; there is no batch or transaction.
//! 2. Deleting a path that is not present is not an error.
//! 3. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod log;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use log::{LogManifestStore, MANIFEST_FILE_NAME};
pub use memory::InMemoryManifestStore;
pub use traits::ManifestStore;
