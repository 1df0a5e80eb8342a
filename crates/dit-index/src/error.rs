//! Error types for the index crate.

use std::path::PathBuf;

/// Errors that can occur while walking a project tree.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// A directory could not be opened or listed, or an entry's metadata
    /// could not be read.
    #[error("cannot traverse {path}: {source}")]
    Traversal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry name is not valid UTF-8 and cannot be recorded in the manifest.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// An entry name the deploy receiver would refuse, such as one
    /// containing a backslash.
    #[error("unsupported file name: {0}")]
    UnsupportedName(PathBuf),
}

impl IndexError {
    /// The path the walker was visiting when it failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Traversal { path, .. } | Self::NonUtf8Path(path) | Self::UnsupportedName(path) => path,
        }
    }
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
