use thiserror::Error;

/// Failures that abort a sync. None are retried by the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("traversal error: {0}")]
    Traversal(#[from] dit_index::IndexError),

    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] dit_crypto::HasherError),

    #[error("manifest store error: {0}")]
    Store(#[from] dit_store::StoreError),

    #[error("archive error: {0}")]
    Archive(#[from] dit_pack::PackError),

    #[error("deploy form error: {0}")]
    Form(#[from] dit_protocol::ProtocolError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
