use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use dit_types::WalkObservation;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{PackError, PackResult};
use crate::extract::{list_entries, ArchivedFile};

/// File name of the in-flight archive inside the state directory.
pub const ARCHIVE_FILE_NAME: &str = "tar.gz";

/// Streams files into a gzip-compressed tar archive backed by a temp file.
///
/// Entries are written strictly in call order; the archive is one linear
/// stream. The backing file is removed when the builder, or the
/// [`FinishedArchive`] it turns into, is dropped, whatever the exit path.
pub struct ArchiveBuilder {
    // Declared before `temp` so the stream is closed before the file is removed.
    builder: tar::Builder<GzEncoder<BufWriter<File>>>,
    temp: NamedTempFile,
    entry_count: usize,
}

impl ArchiveBuilder {
    /// Begin a new archive at `<state_dir>/tar.gz`.
    ///
    /// A file left at that path by a process that was killed mid-sync is
    /// removed first.
    pub fn open(state_dir: &Path) -> PackResult<Self> {
        fs::create_dir_all(state_dir)?;

        let target = state_dir.join(ARCHIVE_FILE_NAME);
        if target.exists() {
            warn!(path = %target.display(), "removing stale archive from an interrupted sync");
            fs::remove_file(&target)?;
        }

        let temp = tempfile::Builder::new()
            .prefix(ARCHIVE_FILE_NAME)
            .rand_bytes(0)
            .tempfile_in(state_dir)?;
        let file = temp.as_file().try_clone()?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

        debug!(path = %temp.path().display(), "archive opened");
        Ok(Self {
            builder: tar::Builder::new(encoder),
            temp,
            entry_count: 0,
        })
    }

    /// Write one regular-file entry: header first, then exactly `size`
    /// bytes from `content`.
    ///
    /// A reader that ends before `size` bytes is an error; extra bytes are
    /// ignored.
    pub fn add_entry<R: Read>(
        &mut self,
        path: &str,
        size: u64,
        mode: u32,
        mtime: SystemTime,
        content: R,
    ) -> PackResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(size);
        header.set_mode(mode & 0o7777);
        header.set_mtime(unix_seconds(mtime));

        self.builder
            .append_data(&mut header, path, ExactReader::new(content, size))
            .map_err(|source| PackError::ArchiveWrite {
                path: path.to_string(),
                source,
            })?;
        self.entry_count += 1;
        debug!(path, size, "archived");
        Ok(())
    }

    /// Append a walked file, taking path, size, mode and mtime from
    /// `observation`.
    pub fn add_observed<R: Read>(
        &mut self,
        observation: &WalkObservation,
        content: R,
    ) -> PackResult<()> {
        self.add_entry(
            &observation.path,
            observation.size,
            observation.mode,
            observation.mtime,
            content,
        )
    }

    /// Number of entries written so far.
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Close the tar and gzip streams and report what was written.
    pub fn finalize(self) -> PackResult<FinishedArchive> {
        let Self {
            builder,
            temp,
            entry_count,
        } = self;
        let finalize_err = |source: io::Error| PackError::Finalize {
            path: temp.path().to_path_buf(),
            source,
        };

        let encoder = builder.into_inner().map_err(finalize_err)?;
        let mut writer = encoder.finish().map_err(finalize_err)?;
        writer.flush().map_err(finalize_err)?;
        drop(writer);

        let byte_size = temp.as_file().metadata()?.len();
        debug!(entry_count, byte_size, "archive finalized");
        Ok(FinishedArchive {
            temp,
            byte_size,
            entry_count,
        })
    }
}

/// A closed archive waiting to be uploaded. Dropping it deletes the file.
#[derive(Debug)]
pub struct FinishedArchive {
    temp: NamedTempFile,
    byte_size: u64,
    entry_count: usize,
}

impl FinishedArchive {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Compressed size on disk.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// `true` when no entry was written. Decided by the entry counter, not
    /// by the size of the compressed stream.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// The compressed archive bytes.
    pub fn read_bytes(&self) -> PackResult<Vec<u8>> {
        Ok(fs::read(self.temp.path())?)
    }

    /// Headers of every entry, in archive order.
    pub fn entries(&self) -> PackResult<Vec<ArchivedFile>> {
        list_entries(File::open(self.temp.path())?)
    }
}

fn unix_seconds(mtime: SystemTime) -> u64 {
    mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Yields exactly `remaining` bytes from `inner`, failing if it runs dry.
///
/// The tar header is written before the content, so a file that shrinks
/// after it was stat'ed must fail the entry instead of desynchronizing the
/// stream.
struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let limit = usize::try_from(self.remaining)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        let n = self.inner.read(&mut buf[..limit])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("content ended {} bytes early", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
