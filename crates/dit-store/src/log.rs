use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use dit_types::{Fingerprint, Manifest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::ManifestStore;

/// File name of the manifest log inside the project state directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.log";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// One mutation of the manifest.
///
/// On-disk framing:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized LogRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum LogRecord {
    Put {
        path: String,
        fingerprint: Fingerprint,
    },
    Remove {
        path: String,
    },
}

struct LogState {
    writer: BufWriter<File>,
    /// Live entries, rebuilt by replay and kept in step with every append.
    entries: Manifest,
    /// Framed records currently on disk, including skipped ones.
    records: usize,
}

/// Manifest store backed by an append-only log file.
///
/// Every `write` and `delete` appends one record and flushes it before
/// returning, so each call commits on its own. Opening the store replays the
/// log front-to-back: records failing the CRC check are skipped, and a torn
/// tail left by an interrupted append is cut off so later appends stay
/// readable. [`compact`](Self::compact) rewrites the log as one record per
/// live entry.
pub struct LogManifestStore {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl LogManifestStore {
    /// Open (or create) the manifest log at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let replay = replay(&file)?;
        let file_len = file.metadata()?.len();
        if replay.valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                file_len,
                "truncating torn manifest log tail"
            );
            file.set_len(replay.valid_len)?;
        }

        debug!(
            path = %path.display(),
            entries = replay.entries.len(),
            records = replay.records,
            "manifest log opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LogState {
                writer: BufWriter::new(file),
                entries: replay.entries,
                records: replay.records,
            }),
        })
    }

    /// Open the manifest log inside a project state directory.
    pub fn open_in(state_dir: &Path) -> StoreResult<Self> {
        Self::open(&state_dir.join(MANIFEST_FILE_NAME))
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live entries.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the log as one `Put` per live entry, sorted by path.
    ///
    /// Returns `false` without touching the file when the log already holds
    /// exactly one record per entry. The rewrite goes through a temp file in
    /// the same directory that is renamed over the log.
    pub fn compact(&self) -> StoreResult<bool> {
        let mut state = self.lock()?;
        if state.records == state.entries.len() {
            return Ok(false);
        }
        state.writer.flush()?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".manifest-")
            .tempfile_in(dir)?;
        {
            let mut out = BufWriter::new(tmp.as_file_mut());
            for (path, fingerprint) in &state.entries {
                out.write_all(&encode_record(&LogRecord::Put {
                    path: path.clone(),
                    fingerprint: *fingerprint,
                })?)?;
            }
            out.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let before = state.records;
        state.writer = BufWriter::new(file);
        state.records = state.entries.len();
        debug!(before, after = state.records, "manifest log compacted");
        Ok(true)
    }

    /// Remove every entry and truncate the log.
    pub fn clear(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.writer.flush()?;
        state.writer.get_ref().set_len(0)?;
        state.entries.clear();
        state.records = 0;
        Ok(())
    }

    /// Flush buffered records and fsync the log.
    pub fn close(self) -> StoreResult<()> {
        let state = self.state.into_inner().map_err(|_| StoreError::Poisoned)?;
        let file = state
            .writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, LogState>> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl LogState {
    fn append(&mut self, record: &LogRecord) -> StoreResult<()> {
        let frame = encode_record(record)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        self.records += 1;
        Ok(())
    }
}

impl ManifestStore for LogManifestStore {
    fn list_all(&self) -> StoreResult<Manifest> {
        Ok(self.lock()?.entries.clone())
    }

    fn write(&self, path: &str, fingerprint: &Fingerprint) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.append(&LogRecord::Put {
            path: path.to_string(),
            fingerprint: *fingerprint,
        })?;
        state.entries.insert(path.to_string(), *fingerprint);
        Ok(())
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        if !state.entries.contains_key(path) {
            return Ok(());
        }
        state.append(&LogRecord::Remove {
            path: path.to_string(),
        })?;
        state.entries.remove(path);
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<Fingerprint>> {
        Ok(self.lock()?.entries.get(path).copied())
    }
}

impl std::fmt::Debug for LogManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogManifestStore")
            .field("path", &self.path)
            .finish()
    }
}

fn encode_record(record: &LogRecord) -> StoreResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("manifest record too large".into()))?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(payload.len() + HEADER_SIZE as usize);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

struct Replay {
    entries: Manifest,
    records: usize,
    /// Offset just past the last complete frame.
    valid_len: u64,
}

fn replay(file: &File) -> StoreResult<Replay> {
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut entries = Manifest::new();
    let mut records = 0;
    let mut offset: u64 = 0;

    while offset + HEADER_SIZE <= file_len {
        let mut header = [0u8; HEADER_SIZE as usize];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let [l0, l1, l2, l3, c0, c1, c2, c3] = header;
        let length = u32::from_le_bytes([l0, l1, l2, l3]);
        let expected_crc = u32::from_le_bytes([c0, c1, c2, c3]);

        let end = offset + HEADER_SIZE + u64::from(length);
        if length == 0 || end > file_len {
            warn!(offset, length, file_len, "invalid manifest record length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        reader.read_exact(&mut payload)?;
        records += 1;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping manifest record");
            offset = end;
            continue;
        }

        match bincode::deserialize::<LogRecord>(&payload) {
            Ok(LogRecord::Put { path, fingerprint }) => {
                entries.insert(path, fingerprint);
            }
            Ok(LogRecord::Remove { path }) => {
                entries.remove(&path);
            }
            Err(e) => {
                warn!(offset, error = %e, "failed to decode manifest record; skipping");
            }
        }
        offset = end;
    }

    Ok(Replay {
        entries,
        records,
        valid_len: offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint::from_hash([byte; 32])
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".dit").join(MANIFEST_FILE_NAME);
        let store = LogManifestStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LogManifestStore::open_in(dir.path()).unwrap();
            store.write("a.txt", &fp(1)).unwrap();
            store.write("b/c.txt", &fp(2)).unwrap();
            store.write("a.txt", &fp(3)).unwrap();
            store.delete("b/c.txt").unwrap();
            store.close().unwrap();
        }

        let store = LogManifestStore::open_in(dir.path()).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["a.txt"], fp(3));
    }

    #[test]
    fn writes_are_visible_without_close() {
        let dir = tempfile::tempdir().unwrap();
        let first = LogManifestStore::open_in(dir.path()).unwrap();
        first.write("a.txt", &fp(1)).unwrap();

        // Each call flushes, so a second handle sees the record.
        let second = LogManifestStore::open_in(dir.path()).unwrap();
        assert_eq!(second.get("a.txt").unwrap(), Some(fp(1)));
    }

    #[test]
    fn delete_missing_appends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogManifestStore::open_in(dir.path()).unwrap();
        store.write("a.txt", &fp(1)).unwrap();
        let before = fs::read(store.path()).unwrap();

        store.delete("not-there").unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn compact_is_noop_without_redundant_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogManifestStore::open_in(dir.path()).unwrap();
        store.write("a.txt", &fp(1)).unwrap();
        store.write("b.txt", &fp(2)).unwrap();
        let before = fs::read(store.path()).unwrap();

        assert!(!store.compact().unwrap());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn compact_drops_superseded_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogManifestStore::open_in(dir.path()).unwrap();
        for i in 0..10 {
            store.write("a.txt", &fp(i)).unwrap();
        }
        store.write("gone.txt", &fp(1)).unwrap();
        store.delete("gone.txt").unwrap();
        let before = fs::metadata(store.path()).unwrap().len();

        assert!(store.compact().unwrap());
        let after = fs::metadata(store.path()).unwrap().len();
        assert!(after < before);

        // Appends after compaction land in the new file.
        store.write("b.txt", &fp(20)).unwrap();
        drop(store);

        let reopened = LogManifestStore::open_in(dir.path()).unwrap();
        let all = reopened.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a.txt"], fp(9));
        assert_eq!(all["b.txt"], fp(20));
        assert!(!reopened.compact().unwrap());
    }

    #[test]
    fn torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        {
            let store = LogManifestStore::open(&path).unwrap();
            store.write("a.txt", &fp(1)).unwrap();
        }
        let good_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[0x40, 0, 0, 0, 1, 2]).unwrap();
        }

        let store = LogManifestStore::open(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), good_len);
        store.write("b.txt", &fp(2)).unwrap();
        drop(store);

        let reopened = LogManifestStore::open(&path).unwrap();
        assert_eq!(reopened.len().unwrap(), 2);
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        {
            let store = LogManifestStore::open(&path).unwrap();
            store.write("a.txt", &fp(1)).unwrap();
            store.write("b.txt", &fp(2)).unwrap();
        }
        // Flip the last payload byte of the first record.
        let mut bytes = fs::read(&path).unwrap();
        let first_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        bytes[HEADER_SIZE as usize + first_len - 1] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        let store = LogManifestStore::open(&path).unwrap();
        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["b.txt"], fp(2));
        // The skipped record still counts as garbage on disk.
        assert!(store.compact().unwrap());
    }

    #[test]
    fn clear_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogManifestStore::open_in(dir.path()).unwrap();
        store.write("a.txt", &fp(1)).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(fs::metadata(store.path()).unwrap().len(), 0);

        store.write("b.txt", &fp(2)).unwrap();
        drop(store);
        let reopened = LogManifestStore::open_in(dir.path()).unwrap();
        assert_eq!(reopened.len().unwrap(), 1);
    }
}
