//! Walk observations and the manifest mapping.

use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::error::TypeError;
use crate::fingerprint::Fingerprint;

/// What the manifest store believes is currently deployed: relative path to
/// the fingerprint recorded at the last sync.
pub type Manifest = BTreeMap<String, Fingerprint>;

/// Metadata for one regular file, produced by the directory walker.
///
/// Directories are traversed but never observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkObservation {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Last modification time.
    pub mtime: SystemTime,
}

impl WalkObservation {
    pub fn new(path: impl Into<String>, size: u64, mode: u32, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            mode,
            mtime,
        }
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Check that `path` is a `/`-separated path that stays below its root:
/// non-empty, not absolute, no empty, `.` or `..` segments, no backslashes.
pub fn validate_relative_path(path: &str) -> Result<(), TypeError> {
    let invalid = || TypeError::InvalidPath(path.to_string());
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(invalid());
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid());
    }
    Ok(())
}
