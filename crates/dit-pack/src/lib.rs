//! Delta archives for dit.
//!
//! A sync streams every new or modified file into a single gzip-compressed
//! tar archive written to `<state_dir>/tar.gz`. Entries carry the file's
//! relative path, size, permission bits and modification time.
//!
//! - [`ArchiveBuilder`]: append-only construction, one entry per call
//! - [`FinishedArchive`]: the closed archive, removed from disk on drop
//! - [`extract_archive`]: unpacking on the receiving side, with path checks

pub mod builder;
pub mod error;
pub mod extract;

pub use builder::{ArchiveBuilder, FinishedArchive, ARCHIVE_FILE_NAME};
pub use error::{PackError, PackResult};
pub use extract::{extract_archive, list_entries, ArchivedFile};
