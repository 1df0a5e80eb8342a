use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid host {0:?}: expected an http:// or https:// URL")]
    InvalidHost(String),

    #[error("invalid application name {0:?}")]
    InvalidAppName(String),

    #[error("invalid deleted path {0:?}")]
    InvalidDeletedPath(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
