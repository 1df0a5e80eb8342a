//! Fingerprinting for dit.
//!
//! A fingerprint is the sync engine's only signal for "unchanged". The
//! default [`MetadataFingerprinter`] hashes `(name, size, mtime)` and never
//! reads file content; [`ContentFingerprinter`] hashes the bytes instead for
//! callers who cannot tolerate touch-only false positives.
//!
//! All hashing is domain-separated BLAKE3.

pub mod hasher;

pub use hasher::{
    ContentFingerprinter, DomainHasher, Fingerprinter, HasherError, MetadataFingerprinter,
};
