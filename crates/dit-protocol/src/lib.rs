//! Upload contract between the dit client and a deploy service.
//!
//! A sync produces a [`DeployForm`]: application name, tag, the deletion set
//! and the optional delta archive. [`UploadTransport`] ships it to
//! `POST {host}/app/deploy` as `multipart/form-data`.

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod form;

pub use auth::AuthMethod;
pub use client::{HttpUploadTransport, UploadReceipt, UploadTransport};
pub use endpoint::{endpoints, DeployResponse, HealthResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use form::{
    app_name, fields, validate_app_name, DeployForm, ARCHIVE_UPLOAD_NAME, DEFAULT_TAG,
};
