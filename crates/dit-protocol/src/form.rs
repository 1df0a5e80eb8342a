use std::path::Path;

use dit_types::validate_relative_path;
use reqwest::multipart::{Form, Part};

use crate::error::{ProtocolError, ProtocolResult};

/// Multipart field names of a deploy request.
pub mod fields {
    pub const NAME: &str = "name";
    pub const TAG: &str = "tag";
    pub const DELETED: &str = "deleted";
    pub const FILE: &str = "file";
}

/// Filename attached to the archive part.
pub const ARCHIVE_UPLOAD_NAME: &str = "tar.gz";

/// Tag used when the caller does not supply one.
pub const DEFAULT_TAG: &str = "latest";

/// Everything one deploy request carries.
///
/// `deleted` is sent only when non-empty, `archive` only when present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployForm {
    pub name: String,
    pub tag: String,
    pub deleted: Vec<String>,
    pub archive: Option<Vec<u8>>,
}

impl DeployForm {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            deleted: Vec::new(),
            archive: None,
        }
    }

    pub fn with_deleted(mut self, deleted: Vec<String>) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn with_archive(mut self, archive: Vec<u8>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// `true` when the request would neither delete nor upload anything.
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.archive.is_none()
    }

    /// Reject names and deleted paths that could escape an app directory.
    pub fn validate(&self) -> ProtocolResult<()> {
        validate_app_name(&self.name)?;
        for path in &self.deleted {
            validate_relative_path(path)
                .map_err(|_| ProtocolError::InvalidDeletedPath(path.clone()))?;
        }
        Ok(())
    }

    /// JSON array for the `deleted` field, or `None` when nothing was deleted.
    pub fn encode_deleted(&self) -> ProtocolResult<Option<String>> {
        if self.deleted.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(&self.deleted)
            .map(Some)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse the `deleted` field.
    pub fn decode_deleted(raw: &str) -> ProtocolResult<Vec<String>> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// Build the `multipart/form-data` body.
    pub fn into_multipart(self) -> ProtocolResult<Form> {
        let deleted = self.encode_deleted()?;
        let mut form = Form::new()
            .text(fields::NAME, self.name)
            .text(fields::TAG, self.tag);
        if let Some(deleted) = deleted {
            form = form.text(fields::DELETED, deleted);
        }
        if let Some(archive) = self.archive {
            let part = Part::bytes(archive)
                .file_name(ARCHIVE_UPLOAD_NAME)
                .mime_str("application/gzip")?;
            form = form.part(fields::FILE, part);
        }
        Ok(form)
    }
}

/// Application name for a project root: its last path segment.
///
/// Pass an absolute path; `.` and `..` have no usable final segment.
pub fn app_name(root: &Path) -> ProtocolResult<String> {
    let name = root
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ProtocolError::InvalidAppName(root.display().to_string()))?;
    validate_app_name(name)?;
    Ok(name.to_string())
}

/// A name must be a single, non-empty path segment.
pub fn validate_app_name(name: &str) -> ProtocolResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(ProtocolError::InvalidAppName(name.to_string()));
    }
    Ok(())
}
