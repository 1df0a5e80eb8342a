use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("failed to write {path} into archive: {source}")]
    ArchiveWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to finalize archive {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsafe archive entry path: {0}")]
    UnsafePath(String),

    #[error("unsupported archive entry type for {path}: {kind}")]
    UnsupportedEntry { path: String, kind: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
