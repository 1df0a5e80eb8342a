//! Directory names that are never walked, fingerprinted or archived.

use std::ffi::OsStr;

/// dit's own state directory at the project root.
pub const STATE_DIR_NAME: &str = ".dit";

/// Names excluded at any depth, together with everything beneath them.
pub const RESERVED_DIRS: &[&str] = &[".git", ".idea", STATE_DIR_NAME, "node_modules"];

/// Returns `true` if a directory with this name must be skipped.
pub fn is_reserved(name: &OsStr) -> bool {
    RESERVED_DIRS.iter().any(|reserved| name == OsStr::new(reserved))
}
