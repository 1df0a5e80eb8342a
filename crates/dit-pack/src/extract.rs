//! Reading delta archives on the receiving side.

use std::fs;
use std::io::Read;
use std::path::Path;

use dit_types::validate_relative_path;
use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{PackError, PackResult};

/// Header fields of one archived file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchivedFile {
    pub path: String,
    pub size: u64,
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub mtime: u64,
}

/// List every entry of a gzip-compressed tar stream without extracting.
pub fn list_entries<R: Read>(reader: R) -> PackResult<Vec<ArchivedFile>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut files = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let header = entry.header();
        files.push(ArchivedFile {
            path: entry_path(&entry)?,
            size: header.size()?,
            mode: header.mode()?,
            mtime: header.mtime()?,
        });
    }
    Ok(files)
}

/// Unpack a gzip-compressed tar stream under `dest`.
///
/// Only regular files and directories are accepted. Entry paths must be
/// relative and free of `..` segments; anything else aborts extraction.
/// Existing files are overwritten. Returns the relative paths of the
/// extracted files in archive order.
pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> PackResult<Vec<String>> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry_path(&entry)?;
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(dest.join(&path))?;
            continue;
        }
        if !kind.is_file() {
            return Err(PackError::UnsupportedEntry {
                path,
                kind: format!("{kind:?}"),
            });
        }

        let target = dest.join(&path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        debug!(path = %path, "extracted");
        extracted.push(path);
    }
    Ok(extracted)
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> PackResult<String> {
    let raw = entry.path_bytes();
    let path = std::str::from_utf8(&raw)
        .map_err(|_| PackError::UnsafePath(String::from_utf8_lossy(&raw).into_owned()))?;
    let path = path.trim_end_matches('/');
    validate_relative_path(path).map_err(|_| PackError::UnsafePath(path.to_string()))?;
    Ok(path.to_string())
}
