use dit_pack::FinishedArchive;
use dit_protocol::DeployForm;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Outcome of one successful sync.
#[derive(Debug)]
pub struct SyncResult {
    /// The delta archive. Removed from disk when this value is dropped.
    pub archive: FinishedArchive,
    /// Manifest paths not observed in this walk, sorted.
    pub deleted_paths: Vec<String>,
    /// `true` when the archive holds no entries.
    pub is_empty: bool,
}

impl SyncResult {
    /// Number of files packed into the archive.
    pub fn packed_count(&self) -> usize {
        self.archive.entry_count()
    }

    /// `true` when there is neither anything to upload nor anything deleted.
    pub fn is_noop(&self) -> bool {
        self.is_empty && self.deleted_paths.is_empty()
    }

    /// Build the upload request. The archive bytes are attached only when
    /// the archive is non-empty.
    pub fn to_deploy_form(&self, name: &str, tag: &str) -> Result<DeployForm> {
        let mut form = DeployForm::new(name, tag).with_deleted(self.deleted_paths.clone());
        if !self.is_empty {
            form = form.with_archive(self.archive.read_bytes()?);
        }
        form.validate()?;
        Ok(form)
    }
}

/// Pending changes of a project tree relative to its manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub entries: Vec<StatusEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing would be uploaded or deleted.
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with the given status.
    pub fn with_status(&self, status: FileStatus) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(move |entry| entry.status == status)
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.with_status(status).count()
    }

    pub(crate) fn push(&mut self, path: impl Into<String>, status: FileStatus) {
        self.entries.push(StatusEntry::new(path, status));
    }

    /// Order entries by path.
    pub(crate) fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
    }
}

/// A single pending change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The file path relative to the project root.
    pub path: String,
    pub status: FileStatus,
}

impl StatusEntry {
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// The kind of file change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Not in the manifest yet.
    New,
    /// In the manifest under a different fingerprint.
    Modified,
    /// In the manifest but gone from the tree.
    Deleted,
}

impl FileStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}
