use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dit_types::{Fingerprint, WalkObservation};

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so tokens produced by different strategies never compare
/// equal. Switching strategies therefore invalidates every stored token.
pub struct DomainHasher {
    domain: &'static str,
}

impl DomainHasher {
    /// Hasher for metadata-derived fingerprints.
    pub const METADATA: Self = Self {
        domain: "dit-meta-v1",
    };
    /// Hasher for content-derived fingerprints.
    pub const CONTENT: Self = Self {
        domain: "dit-content-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Fingerprint {
        let mut hasher = self.start();
        hasher.update(data);
        Fingerprint::from_hash(*hasher.finalize().as_bytes())
    }

    /// A BLAKE3 state already seeded with the domain tag, for streaming input.
    pub fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Strategy that turns one walk observation into a fingerprint.
pub trait Fingerprinter: Send + Sync {
    /// Compute the token for `observation`, a file located under `root`.
    fn fingerprint(&self, root: &Path, observation: &WalkObservation)
        -> Result<Fingerprint, HasherError>;

    /// Short strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Fingerprint over `(base name, size, modification time)`.
///
/// O(1) per file regardless of size. Two files with identical content but
/// different mtimes get different tokens; different content with coincidentally
/// identical name, size and mtime gets the same token.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataFingerprinter;

impl MetadataFingerprinter {
    /// The pure metadata token.
    pub fn compute(name: &str, size: u64, mtime: SystemTime) -> Fingerprint {
        let input = format!("{name}:{size}:{}", encode_mtime(mtime));
        DomainHasher::METADATA.hash(input.as_bytes())
    }
}

impl Fingerprinter for MetadataFingerprinter {
    fn fingerprint(
        &self,
        _root: &Path,
        observation: &WalkObservation,
    ) -> Result<Fingerprint, HasherError> {
        Ok(Self::compute(
            observation.name(),
            observation.size,
            observation.mtime,
        ))
    }

    fn name(&self) -> &'static str {
        "metadata"
    }
}

/// Fingerprint over the file's bytes. Correct under touch-only changes but
/// O(bytes): every file is read in full on every sync.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentFingerprinter;

impl Fingerprinter for ContentFingerprinter {
    fn fingerprint(
        &self,
        root: &Path,
        observation: &WalkObservation,
    ) -> Result<Fingerprint, HasherError> {
        let path = root.join(&observation.path);
        let io_err = |source: io::Error| HasherError::Io {
            path: path.clone(),
            source,
        };
        let mut file = File::open(&path).map_err(io_err)?;
        let mut hasher = DomainHasher::CONTENT.start();
        io::copy(&mut file, &mut hasher).map_err(io_err)?;
        Ok(Fingerprint::from_hash(*hasher.finalize().as_bytes()))
    }

    fn name(&self) -> &'static str {
        "content"
    }
}

/// Signed seconds and nanoseconds relative to the Unix epoch.
fn encode_mtime(mtime: SystemTime) -> String {
    match mtime.duration_since(UNIX_EPOCH) {
        Ok(d) => format!("+{}.{:09}", d.as_secs(), d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            format!("-{}.{:09}", d.as_secs(), d.subsec_nanos())
        }
    }
}

/// Errors from fingerprinting.
#[derive(Debug, thiserror::Error)]
pub enum HasherError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
