//! Delta synchronization for dit.
//!
//! [`SyncEngine::run`] makes one pass over a project tree: it loads the
//! manifest snapshot, walks the tree, re-fingerprints every regular file,
//! records and archives the ones that are new or changed, and finally
//! removes manifest entries for paths that were not seen. The caller ships
//! the resulting [`SyncResult`] with an
//! [`UploadTransport`](dit_protocol::UploadTransport).
//!
//! Store writes commit as they happen. A sync that fails part way leaves the
//! entries it already wrote; the temporary archive is always removed.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use types::{ChangeSet, FileStatus, StatusEntry, SyncResult};
