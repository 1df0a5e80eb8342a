//! Foundation types for dit, the deploy-time delta synchronizer.
//!
//! Every other dit crate depends on `dit-types`.
//!
//! # Key Types
//!
//! - [`Fingerprint`] -- Opaque change-detection token for one file
//! - [`WalkObservation`] -- Metadata of one regular file seen during a walk
//! - [`Manifest`] -- Path to fingerprint mapping of what is currently deployed

pub mod error;
pub mod fingerprint;
pub mod observation;

pub use error::TypeError;
pub use fingerprint::Fingerprint;
pub use observation::{validate_relative_path, Manifest, WalkObservation};
