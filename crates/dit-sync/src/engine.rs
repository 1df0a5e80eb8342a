use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dit_crypto::{Fingerprinter, MetadataFingerprinter};
use dit_index::{DirectoryWalker, IndexError, STATE_DIR_NAME};
use dit_pack::{ArchiveBuilder, ARCHIVE_FILE_NAME};
use dit_store::ManifestStore;
use dit_types::{Fingerprint, Manifest, WalkObservation};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{ChangeSet, FileStatus, SyncResult};

/// Drives one project tree through load, walk/diff/pack and deletion
/// reconciliation.
///
/// The engine holds configuration only. Every call to [`run`](Self::run)
/// owns its own seen-set and archive, and the manifest store is passed in
/// per call.
#[derive(Clone)]
pub struct SyncEngine {
    root: PathBuf,
    state_dir: PathBuf,
    fingerprinter: Arc<dyn Fingerprinter>,
}

impl SyncEngine {
    /// Engine for `root` with state kept in `<root>/.dit` and metadata
    /// fingerprints.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(STATE_DIR_NAME);
        Self {
            root,
            state_dir,
            fingerprinter: Arc::new(MetadataFingerprinter),
        }
    }

    /// Keep the temporary archive somewhere other than `<root>/.dit`.
    ///
    /// A state directory inside the root is never walked, whatever its name.
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    /// Swap the change-detection strategy.
    pub fn with_fingerprinter(mut self, fingerprinter: impl Fingerprinter + 'static) -> Self {
        self.fingerprinter = Arc::new(fingerprinter);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn fingerprinter_name(&self) -> &'static str {
        self.fingerprinter.name()
    }

    /// Run a full sync against `store`.
    ///
    /// The first error aborts the run. Store writes made before it are kept;
    /// the partially written archive is removed.
    pub fn run(&self, store: &dyn ManifestStore) -> Result<SyncResult> {
        let snapshot = store.list_all()?;
        info!(
            root = %self.root.display(),
            tracked = snapshot.len(),
            strategy = self.fingerprinter.name(),
            "loaded manifest"
        );

        let mut archive = ArchiveBuilder::open(&self.state_dir)?;
        let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.len());
        let mut walked = 0usize;

        for observation in self.walker().walk() {
            let observation = observation?;
            walked += 1;
            let fingerprint = self.fingerprint(&observation)?;

            if snapshot.get(&observation.path) != Some(&fingerprint) {
                let content = self.open(&observation)?;
                store.write(&observation.path, &fingerprint)?;
                archive.add_observed(&observation, content)?;
            }
            seen.insert(observation.path);
        }

        let deleted_paths = self.reconcile_deletions(store, &snapshot, &seen)?;

        let archive = archive.finalize()?;
        let is_empty = archive.is_empty();
        info!(
            walked,
            packed = archive.entry_count(),
            deleted = deleted_paths.len(),
            archive_bytes = archive.byte_size(),
            "sync complete"
        );

        Ok(SyncResult {
            archive,
            deleted_paths,
            is_empty,
        })
    }

    /// Compute what [`run`](Self::run) would do without touching the store
    /// or writing an archive.
    pub fn plan(&self, store: &dyn ManifestStore) -> Result<ChangeSet> {
        let snapshot = store.list_all()?;
        let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.len());
        let mut changes = ChangeSet::new();

        for observation in self.walker().walk() {
            let observation = observation?;
            let fingerprint = self.fingerprint(&observation)?;
            match snapshot.get(&observation.path) {
                None => changes.push(observation.path.as_str(), FileStatus::New),
                Some(stored) if *stored != fingerprint => {
                    changes.push(observation.path.as_str(), FileStatus::Modified)
                }
                Some(_) => {}
            }
            seen.insert(observation.path);
        }

        for path in snapshot.keys().filter(|path| !seen.contains(*path)) {
            changes.push(path.as_str(), FileStatus::Deleted);
        }
        changes.sort();
        Ok(changes)
    }

    /// Walker over the root that also prunes the state directory and the
    /// archive when they live inside the root.
    fn walker(&self) -> DirectoryWalker {
        let walker = DirectoryWalker::new(&self.root)
            .with_excluded(self.state_dir.join(ARCHIVE_FILE_NAME));
        match self.state_dir.strip_prefix(&self.root) {
            Ok(rel) if !rel.as_os_str().is_empty() => walker.with_excluded(self.state_dir.clone()),
            _ => walker,
        }
    }

    fn open(&self, observation: &WalkObservation) -> Result<File> {
        let path = self.root.join(&observation.path);
        File::open(&path).map_err(|source| IndexError::Traversal { path, source }.into())
    }

    fn fingerprint(&self, observation: &WalkObservation) -> Result<Fingerprint> {
        Ok(self.fingerprinter.fingerprint(&self.root, observation)?)
    }

    /// Delete every snapshot entry that was not seen, in path order.
    fn reconcile_deletions(
        &self,
        store: &dyn ManifestStore,
        snapshot: &Manifest,
        seen: &HashSet<String>,
    ) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        for path in snapshot.keys() {
            if seen.contains(path) {
                continue;
            }
            store.delete(path)?;
            debug!(path = %path, "deleted");
            deleted.push(path.clone());
        }
        Ok(deleted)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("root", &self.root)
            .field("state_dir", &self.state_dir)
            .field("fingerprinter", &self.fingerprinter.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use dit_crypto::ContentFingerprinter;
    use dit_pack::ARCHIVE_FILE_NAME;
    use dit_store::{InMemoryManifestStore, LogManifestStore, StoreError, StoreResult};
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn write_file(root: &Path, rel: &str, content: &[u8], mtime: SystemTime) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    fn archived_paths(result: &SyncResult) -> Vec<String> {
        let mut paths: Vec<_> = result
            .archive
            .entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        paths.sort();
        paths
    }

    fn fp(name: &str, size: u64, mtime: SystemTime) -> Fingerprint {
        MetadataFingerprinter::compute(name, size, mtime)
    }

    #[test]
    fn first_second_and_third_sync() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(root, "a.txt", &[b'a'; 10], at(1_000));
        write_file(root, "b/c.txt", &[b'c'; 20], at(2_000));
        let engine = SyncEngine::new(root);
        let store = InMemoryManifestStore::new();

        // Fresh store: everything is new.
        let first = engine.run(&store).unwrap();
        assert_eq!(archived_paths(&first), vec!["a.txt", "b/c.txt"]);
        assert!(first.deleted_paths.is_empty());
        assert!(!first.is_empty);
        let manifest = store.list_all().unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest["a.txt"], fp("a.txt", 10, at(1_000)));
        assert_eq!(manifest["b/c.txt"], fp("c.txt", 20, at(2_000)));
        drop(first);

        // a.txt rewritten with a new size and mtime.
        write_file(root, "a.txt", &[b'A'; 15], at(3_000));
        let second = engine.run(&store).unwrap();
        assert_eq!(archived_paths(&second), vec!["a.txt"]);
        assert!(second.deleted_paths.is_empty());
        assert_eq!(
            store.get("a.txt").unwrap(),
            Some(fp("a.txt", 15, at(3_000)))
        );
        assert_eq!(
            store.get("b/c.txt").unwrap(),
            Some(fp("c.txt", 20, at(2_000)))
        );
        drop(second);

        // b/ removed entirely.
        fs::remove_dir_all(root.join("b")).unwrap();
        let third = engine.run(&store).unwrap();
        assert!(third.is_empty);
        assert!(archived_paths(&third).is_empty());
        assert_eq!(third.deleted_paths, vec!["b/c.txt"]);
        let manifest = store.list_all().unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest["a.txt"], fp("a.txt", 15, at(3_000)));
    }

    #[test]
    fn touched_file_is_the_only_one_resent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_file(root, "a.txt", &[b'a'; 10], at(1_000));
        write_file(root, "b/c.txt", &[b'c'; 20], at(2_000));
        let engine = SyncEngine::new(root);
        let store = InMemoryManifestStore::new();
        drop(engine.run(&store).unwrap());

        // Same bytes, same size; only the modification time moves.
        File::options()
            .write(true)
            .open(root.join("a.txt"))
            .unwrap()
            .set_modified(at(4_000))
            .unwrap();

        let result = engine.run(&store).unwrap();
        assert_eq!(archived_paths(&result), vec!["a.txt"]);
        assert_eq!(result.archive.entries().unwrap()[0].mtime, 4_000);
        assert!(result.deleted_paths.is_empty());
        assert_eq!(
            store.get("a.txt").unwrap(),
            Some(fp("a.txt", 10, at(4_000)))
        );
        assert_ne!(fp("a.txt", 10, at(4_000)), fp("a.txt", 10, at(1_000)));
        assert_eq!(
            store.get("b/c.txt").unwrap(),
            Some(fp("c.txt", 20, at(2_000)))
        );
    }

    #[test]
    fn state_dir_inside_root_is_never_walked() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"a", at(1));
        let engine = SyncEngine::new(dir.path()).with_state_dir(dir.path().join("state"));
        let store = InMemoryManifestStore::new();

        let first = engine.run(&store).unwrap();
        assert_eq!(
            first.archive.path(),
            dir.path().join("state").join(ARCHIVE_FILE_NAME).as_path()
        );
        assert_eq!(archived_paths(&first), vec!["a.txt"]);
        let keys: Vec<_> = store.list_all().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["a.txt"]);
        drop(first);

        let second = engine.run(&store).unwrap();
        assert!(second.is_empty);
        assert!(second.deleted_paths.is_empty());
        drop(second);

        assert_eq!(engine.plan(&store).unwrap().len(), 0);
    }

    #[test]
    fn unchanged_tree_syncs_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "x/y.txt", b"hello", at(10));
        let engine = SyncEngine::new(dir.path());
        let store = InMemoryManifestStore::new();

        drop(engine.run(&store).unwrap());
        let before = store.list_all().unwrap();
        let again = engine.run(&store).unwrap();
        assert!(again.is_empty);
        assert!(again.deleted_paths.is_empty());
        assert!(again.is_noop());
        assert_eq!(store.list_all().unwrap(), before);
    }

    #[test]
    fn deleted_paths_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["m.txt", "z/1.txt", "a/2.txt", "k.txt"] {
            write_file(dir.path(), name, b"x", at(5));
        }
        let engine = SyncEngine::new(dir.path());
        let store = InMemoryManifestStore::new();
        drop(engine.run(&store).unwrap());

        for name in ["m.txt", "z", "a", "k.txt"] {
            let path = dir.path().join(name);
            if path.is_dir() {
                fs::remove_dir_all(path).unwrap();
            } else {
                fs::remove_file(path).unwrap();
            }
        }
        let result = engine.run(&store).unwrap();
        assert_eq!(result.deleted_paths, vec!["a/2.txt", "k.txt", "m.txt", "z/1.txt"]);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reserved_directories_never_reach_store_or_archive() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "app.js", b"js", at(1));
        write_file(dir.path(), "node_modules/dep/index.js", b"dep", at(1));
        write_file(dir.path(), "web/node_modules/dep/index.js", b"dep", at(1));
        write_file(dir.path(), ".git/HEAD", b"ref", at(1));
        write_file(dir.path(), "sub/.idea/ws.xml", b"x", at(1));

        let store = InMemoryManifestStore::new();
        let result = SyncEngine::new(dir.path()).run(&store).unwrap();

        assert_eq!(archived_paths(&result), vec!["app.js"]);
        let keys: Vec<_> = store.list_all().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["app.js"]);
    }

    #[test]
    fn archive_lives_in_state_dir_until_result_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"a", at(1));
        let engine = SyncEngine::new(dir.path());
        let archive_path = dir.path().join(STATE_DIR_NAME).join(ARCHIVE_FILE_NAME);

        let result = engine.run(&InMemoryManifestStore::new()).unwrap();
        assert_eq!(result.archive.path(), archive_path.as_path());
        assert!(archive_path.exists());
        drop(result);
        assert!(!archive_path.exists());
    }

    #[test]
    fn deploy_form_attaches_archive_only_when_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"a", at(1));
        write_file(dir.path(), "b.txt", b"b", at(1));
        let engine = SyncEngine::new(dir.path());
        let store = InMemoryManifestStore::new();

        let first = engine.run(&store).unwrap();
        let form = first.to_deploy_form("shop", "v1").unwrap();
        assert_eq!(form.name, "shop");
        assert_eq!(form.tag, "v1");
        assert!(form.deleted.is_empty());
        assert_eq!(form.archive.as_deref().map(<[u8]>::len), Some(first.archive.byte_size() as usize));
        drop(first);

        fs::remove_file(dir.path().join("b.txt")).unwrap();
        let second = engine.run(&store).unwrap();
        let form = second.to_deploy_form("shop", "v1").unwrap();
        assert!(form.archive.is_none());
        assert_eq!(form.deleted, vec!["b.txt"]);
    }

    #[test]
    fn content_strategy_ignores_touches() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"same", at(1));
        let engine = SyncEngine::new(dir.path()).with_fingerprinter(ContentFingerprinter);
        assert_eq!(engine.fingerprinter_name(), "content");
        let store = InMemoryManifestStore::new();
        drop(engine.run(&store).unwrap());

        write_file(dir.path(), "a.txt", b"same", at(99));
        assert!(engine.run(&store).unwrap().is_empty);

        write_file(dir.path(), "a.txt", b"diff", at(99));
        assert!(!engine.run(&store).unwrap().is_empty);
    }

    #[test]
    fn plan_reports_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "keep.txt", b"k", at(1));
        write_file(dir.path(), "edit.txt", b"e", at(1));
        write_file(dir.path(), "gone.txt", b"g", at(1));
        let engine = SyncEngine::new(dir.path());
        let store = InMemoryManifestStore::new();
        drop(engine.run(&store).unwrap());
        fs::remove_dir_all(dir.path().join(STATE_DIR_NAME)).unwrap();

        write_file(dir.path(), "edit.txt", b"edited", at(2));
        write_file(dir.path(), "fresh.txt", b"f", at(2));
        fs::remove_file(dir.path().join("gone.txt")).unwrap();

        let before = store.list_all().unwrap();
        let changes = engine.plan(&store).unwrap();
        assert_eq!(store.list_all().unwrap(), before);
        assert!(!dir.path().join(STATE_DIR_NAME).exists());

        let summary: Vec<_> = changes
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("edit.txt", FileStatus::Modified),
                ("fresh.txt", FileStatus::New),
                ("gone.txt", FileStatus::Deleted),
            ]
        );
    }

    /// Wraps the in-memory store and fails the n-th write (1-based).
    struct FailingStore {
        inner: InMemoryManifestStore,
        fail_on_write: usize,
        writes: AtomicUsize,
    }

    impl ManifestStore for FailingStore {
        fn list_all(&self) -> StoreResult<Manifest> {
            self.inner.list_all()
        }

        fn write(&self, path: &str, fingerprint: &Fingerprint) -> StoreResult<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_on_write {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.write(path, fingerprint)
        }

        fn delete(&self, path: &str) -> StoreResult<()> {
            self.inner.delete(path)
        }
    }

    #[test]
    fn store_failure_keeps_earlier_writes_and_removes_archive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            write_file(dir.path(), name, b"data", at(1));
        }
        let store = FailingStore {
            inner: InMemoryManifestStore::new(),
            fail_on_write: 2,
            writes: AtomicUsize::new(0),
        };

        let err = SyncEngine::new(dir.path()).run(&store).unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::Unavailable(_))));
        assert_eq!(store.inner.len().unwrap(), 1);
        assert!(!dir
            .path()
            .join(STATE_DIR_NAME)
            .join(ARCHIVE_FILE_NAME)
            .exists());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_aborts_and_cleans_up() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"a", at(1));
        write_file(dir.path(), "z.txt", b"z", at(1));
        write_file(dir.path(), "locked/inner.txt", b"i", at(1));
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = InMemoryManifestStore::new();
        let result = SyncEngine::new(dir.path()).run(&store);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(SyncError::Traversal(_))));
        assert!(!dir
            .path()
            .join(STATE_DIR_NAME)
            .join(ARCHIVE_FILE_NAME)
            .exists());
        // Whatever was recorded before the failure stays recorded.
        let manifest = store.list_all().unwrap();
        assert!(!manifest.contains_key("locked/inner.txt"));
        assert!(manifest.keys().all(|k| k == "a.txt" || k == "z.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_a_traversal_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "secret.txt", b"s", at(1));
        let secret = dir.path().join("secret.txt");
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

        if File::open(&secret).is_ok() {
            return;
        }

        let store = InMemoryManifestStore::new();
        let err = SyncEngine::new(dir.path()).run(&store).unwrap_err();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();

        match err {
            SyncError::Traversal(inner) => assert_eq!(inner.path(), secret.as_path()),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn unsendable_name_aborts_before_it_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a\\b.txt", b"x", at(1));

        let store = InMemoryManifestStore::new();
        let err = SyncEngine::new(dir.path()).run(&store).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Traversal(dit_index::IndexError::UnsupportedName(_))
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn log_store_survives_reopen_between_syncs() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.txt", b"a", at(1));
        let engine = SyncEngine::new(dir.path());

        let store = LogManifestStore::open_in(engine.state_dir()).unwrap();
        drop(engine.run(&store).unwrap());
        store.close().unwrap();

        let store = LogManifestStore::open_in(engine.state_dir()).unwrap();
        let result = engine.run(&store).unwrap();
        assert!(result.is_empty);
        assert!(result.deleted_paths.is_empty());
    }

    mod idempotence {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        fn tree() -> impl Strategy<Value = BTreeMap<String, (usize, u64)>> {
            prop::collection::btree_map(
                "[a-c]{1,2}(/[a-c]{1,2}){0,2}",
                (0usize..64, 1u64..1_000_000),
                0..8,
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn second_sync_changes_nothing(files in tree()) {
                let dir = tempfile::tempdir().unwrap();
                for (stem, (len, secs)) in &files {
                    write_file(dir.path(), &format!("{stem}.txt"), &vec![b'x'; *len], at(*secs));
                }
                let engine = SyncEngine::new(dir.path());
                let log_path = engine.state_dir().join(dit_store::MANIFEST_FILE_NAME);

                let store = LogManifestStore::open_in(engine.state_dir()).unwrap();
                let first = engine.run(&store).unwrap();
                prop_assert_eq!(first.archive.entry_count(), files.len());
                drop(first);
                let before = fs::read(&log_path).unwrap();

                let second = engine.run(&store).unwrap();
                prop_assert!(second.is_empty);
                prop_assert!(second.deleted_paths.is_empty());
                drop(second);
                prop_assert_eq!(fs::read(&log_path).unwrap(), before);
            }
        }
    }
}
