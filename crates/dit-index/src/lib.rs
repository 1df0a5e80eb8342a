//! Project tree walking for dit.
//!
//! Enumerates every regular file under a project root, depth-first and
//! pre-order, pruning reserved directories (version control, IDE metadata,
//! dit's own state, dependency caches) at any depth.
//!
//! # Key Types
//!
//! - [`DirectoryWalker`] -- configured walker for one project root
//! - [`Walk`] -- lazy iterator of [`WalkObservation`](dit_types::WalkObservation)s
//! - [`IndexError`] -- traversal failures, carrying the offending path

pub mod error;
pub mod reserved;
pub mod walker;

pub use error::{IndexError, IndexResult};
pub use reserved::{is_reserved, RESERVED_DIRS, STATE_DIR_NAME};
pub use walker::{DirectoryWalker, Walk};
