//! Depth-first enumeration of regular files under a project root.
//!
//! Traversal uses `walkdir`'s explicit stack, so nesting depth is bounded by
//! memory rather than the call stack. Sibling order is whatever the
//! directory listing returns; callers must not rely on it.
//!
//! Non-regular entries: symbolic links are never followed and, like
//! sockets, FIFOs and device files, are skipped with a debug log line.
//!
//! Every observed path is one the deploy receiver will accept. A name it
//! would refuse (a backslash, say) fails the walk.

use std::io;
use std::path::{Component, Path, PathBuf};

use dit_types::{validate_relative_path, WalkObservation};
use tracing::debug;
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::error::{IndexError, IndexResult};
use crate::reserved::is_reserved;

/// Walker for a single project root.
#[derive(Clone, Debug)]
pub struct DirectoryWalker {
    root: PathBuf,
    excluded: Vec<PathBuf>,
}

type EntryFilter = Box<dyn FnMut(&DirEntry) -> bool + Send>;

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Also prune `path`, given as `root` joined with a relative path.
    pub fn with_excluded(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    /// The project root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new lazy walk.
    pub fn walk(&self) -> Walk {
        let excluded = self.excluded.clone();
        let filter: EntryFilter = Box::new(move |entry: &DirEntry| {
            keep_entry(entry) && !excluded.iter().any(|p| p == entry.path())
        });
        let inner = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(filter);
        Walk {
            root: self.root.clone(),
            inner,
            failed: false,
        }
    }
}

/// Lazy sequence of [`WalkObservation`]s.
///
/// The first error ends the walk: after yielding an `Err`, the iterator
/// returns `None`.
pub struct Walk {
    root: PathBuf,
    inner: FilterEntry<walkdir::IntoIter, EntryFilter>,
    failed: bool,
}

impl Walk {
    fn observe(&self, entry: &DirEntry) -> IndexResult<WalkObservation> {
        let path = entry.path();
        let metadata = entry
            .metadata()
            .map_err(|err| traversal_error(&self.root, err))?;
        let mtime = metadata.modified().map_err(|source| IndexError::Traversal {
            path: path.to_path_buf(),
            source,
        })?;
        let relative = relative_path(&self.root, path)?;

        Ok(WalkObservation {
            path: relative,
            size: metadata.len(),
            mode: permission_bits(&metadata),
            mtime,
        })
    }
}

impl Iterator for Walk {
    type Item = IndexResult<WalkObservation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(traversal_error(&self.root, err)));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %entry.path().display(), "skipping non-regular entry");
                continue;
            }

            let observed = self.observe(&entry);
            if observed.is_err() {
                self.failed = true;
            }
            return Some(observed);
        }
    }
}

/// Prune reserved directories below the root. The root itself is always kept.
fn keep_entry(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !(entry.file_type().is_dir() && is_reserved(entry.file_name()))
}

fn traversal_error(root: &Path, err: walkdir::Error) -> IndexError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
    IndexError::Traversal { path, source }
}

/// `/`-joined path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> IndexResult<String> {
    let stripped = path.strip_prefix(root).map_err(|_| IndexError::Traversal {
        path: path.to_path_buf(),
        source: io::Error::other("entry is outside the project root"),
    })?;

    let mut segments = Vec::new();
    for component in stripped.components() {
        if let Component::Normal(name) = component {
            let name = name
                .to_str()
                .ok_or_else(|| IndexError::NonUtf8Path(path.to_path_buf()))?;
            segments.push(name);
        }
    }
    if segments.is_empty() {
        return Err(IndexError::Traversal {
            path: path.to_path_buf(),
            source: io::Error::other("project root is not a directory"),
        });
    }
    let relative = segments.join("/");
    validate_relative_path(&relative)
        .map_err(|_| IndexError::UnsupportedName(path.to_path_buf()))?;
    Ok(relative)
}

#[cfg(unix)]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}
