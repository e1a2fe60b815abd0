//! Watched files loaded into a key/value store.
//!
//! A [`ResourceLoader`] scans its roots once when it starts, then keeps the
//! store in sync from change events: creates and writes (re)load a file
//! under its resolved key, removes and renames drop the key. Per-file
//! failures are logged and skipped so one bad file never blocks the rest.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::event::{ChangeEvent, Op};
use crate::key::{KeyResolver, KeyStrategy};
use crate::path_watcher::{PathWatcher, resolve_path};
use crate::store::{MemoryStore, ReadOnlyStore, SharedStore};
use crate::{WatchError, WatchResult};

/// Marker appended by editors and atomic writers to temporary files.
pub const DEFAULT_ATOMIC_MARKER: &str = "~$";

/// Configuration for a [`ResourceLoader`].
#[derive(Clone)]
pub struct LoaderConfig {
    /// Watch roots
    pub paths: Vec<PathBuf>,
    /// Extension stripped by [`KeyStrategy::NameNoExtension`] (`"pem"` or
    /// `".pem"`). Files without it yield no key under that strategy; the
    /// other strategies ignore it.
    pub extension: Option<String>,
    /// How file paths become keys
    pub key_strategy: KeyStrategy,
    /// Where loaded content goes
    pub storage: Option<SharedStore>,
    /// Watch subdirectories as well
    pub watch_subfolders: bool,
    /// Operations that trigger a load or an unload
    pub ops: Op,
    /// Regex marking staged copies. A create or write on a staged copy
    /// loads the unmarked file; removing a staged copy is ignored.
    pub atomic_marker: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let storage: SharedStore = Arc::new(MemoryStore::<String, Vec<u8>>::new());
        Self {
            paths: Vec::new(),
            extension: None,
            key_strategy: KeyStrategy::default(),
            storage: Some(storage),
            watch_subfolders: false,
            ops: Op::CREATE | Op::WRITE | Op::RENAME | Op::REMOVE,
            atomic_marker: Some(DEFAULT_ATOMIC_MARKER.to_string()),
        }
    }
}

impl std::fmt::Debug for LoaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderConfig")
            .field("paths", &self.paths)
            .field("extension", &self.extension)
            .field("key_strategy", &self.key_strategy)
            .field("storage", &self.storage.is_some())
            .field("watch_subfolders", &self.watch_subfolders)
            .field("ops", &self.ops)
            .field("atomic_marker", &self.atomic_marker)
            .finish()
    }
}

impl LoaderConfig {
    /// Create a config for the given roots with default settings.
    #[must_use]
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the extension used by [`KeyStrategy::NameNoExtension`].
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Set the key strategy.
    #[must_use]
    pub const fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    /// Use a caller-provided store.
    #[must_use]
    pub fn with_storage(mut self, storage: SharedStore) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Watch subdirectories as well.
    #[must_use]
    pub const fn with_subfolders(mut self, enabled: bool) -> Self {
        self.watch_subfolders = enabled;
        self
    }

    /// Replace the operation filter.
    #[must_use]
    pub const fn with_ops(mut self, ops: Op) -> Self {
        self.ops = ops;
        self
    }

    /// Replace the atomic-replace marker pattern.
    #[must_use]
    pub fn with_atomic_marker(mut self, pattern: impl Into<String>) -> Self {
        self.atomic_marker = Some(pattern.into());
        self
    }

    /// Disable atomic-replace marker stripping.
    #[must_use]
    pub fn without_atomic_marker(mut self) -> Self {
        self.atomic_marker = None;
        self
    }
}

/// Keeps a key/value store in sync with files under a set of roots.
pub struct ResourceLoader {
    core: Arc<LoaderCore>,
    subfolders: bool,
    watcher: Option<PathWatcher>,
}

impl std::fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("roots", &self.core.roots)
            .field("resolver", &self.core.resolver)
            .field("watching", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}

impl ResourceLoader {
    /// Validate the config and build an unstarted loader.
    ///
    /// # Errors
    ///
    /// [`WatchError::NoPathsSpecified`], [`WatchError::PathDoesNotExist`],
    /// [`WatchError::EmptyExtension`], [`WatchError::StorageNotSpecified`]
    /// or [`WatchError::InvalidPattern`], checked in that order.
    pub fn new(config: LoaderConfig) -> WatchResult<Self> {
        if config.paths.is_empty() {
            return Err(WatchError::NoPathsSpecified);
        }
        let roots = config
            .paths
            .iter()
            .map(|p| resolve_path(p))
            .collect::<WatchResult<Vec<_>>>()?;

        match config.extension.as_deref() {
            Some("" | ".") => return Err(WatchError::EmptyExtension),
            None if config.key_strategy == KeyStrategy::NameNoExtension => {
                return Err(WatchError::EmptyExtension);
            }
            _ => {}
        }
        let storage = config.storage.ok_or(WatchError::StorageNotSpecified)?;
        let marker = config.atomic_marker.as_deref().map(Regex::new).transpose()?;

        let resolver = KeyResolver::new(config.key_strategy, config.extension.as_deref(), roots.clone());
        Ok(Self {
            core: Arc::new(LoaderCore {
                roots,
                resolver,
                storage,
                ops: config.ops,
                marker,
            }),
            subfolders: config.watch_subfolders,
            watcher: None,
        })
    }

    /// Load every matching file, then start watching. Does nothing if
    /// already watching.
    ///
    /// # Errors
    ///
    /// [`WatchError::InitialScan`] if a root cannot be read, or a watcher
    /// start failure. Watching is not started in either case.
    pub fn start_watching(&mut self) -> WatchResult<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        self.core.scan()?;

        let core = Arc::clone(&self.core);
        let mut watcher = PathWatcher::new()
            .watch_subfolders(self.subfolders)
            .on_event(move |event| core.handle(&event))
            .on_error(|err| debug!(error = %err, "resource loader watch error"));
        for root in &self.core.roots {
            watcher.add_path(root)?;
        }
        watcher.start()?;

        info!(roots = self.core.roots.len(), entries = self.core.storage.len(), "resource loader watching");
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching. Loaded entries stay in the store. Safe to call
    /// repeatedly.
    pub fn stop_watching(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.close();
            debug!("resource loader stopped");
        }
    }

    /// Re-run the initial scan against the live store.
    ///
    /// # Errors
    ///
    /// [`WatchError::InitialScan`] if a root cannot be read.
    pub fn rescan(&self) -> WatchResult<()> {
        self.core.scan()
    }

    /// Read-only view of the store.
    #[must_use]
    pub fn storage(&self) -> ReadOnlyStore<String, Vec<u8>> {
        ReadOnlyStore::new(Arc::clone(&self.core.storage))
    }

    /// Whether the watcher is running.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// The resolved roots.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.core.roots
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

struct LoaderCore {
    roots: Vec<PathBuf>,
    resolver: KeyResolver,
    storage: SharedStore,
    ops: Op,
    marker: Option<Regex>,
}

impl LoaderCore {
    fn scan(&self) -> WatchResult<()> {
        for root in &self.roots {
            for entry in WalkDir::new(root) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(source) if source.depth() == 0 => {
                        return Err(WatchError::InitialScan {
                            path: root.clone(),
                            source,
                        });
                    }
                    Err(e) => {
                        warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                        continue;
                    }
                };
                if entry.file_type().is_dir() {
                    continue;
                }
                self.apply(entry.path(), Op::CREATE);
            }
        }
        debug!(entries = self.storage.len(), "initial scan complete");
        Ok(())
    }

    fn handle(&self, event: &ChangeEvent) {
        if !event.is(self.ops) {
            return;
        }
        self.apply(&event.path, event.op);
    }

    fn apply(&self, path: &Path, op: Op) {
        let Some(key) = self.resolver.resolve(path) else {
            debug!(path = %path.display(), strategy = ?self.resolver.strategy(), "no key for path");
            return;
        };
        let staged = self.strip_marker(path, &key);

        if op.intersects(Op::REMOVE | Op::RENAME) {
            if staged.is_some() {
                debug!(path = %path.display(), "staged copy went away, target left alone");
                return;
            }
            if self.storage.remove(&key) {
                debug!(%key, "resource removed");
            }
        } else {
            match staged {
                Some((target, key)) => self.load(&target, key),
                None => self.load(path, key),
            }
        }
    }

    fn load(&self, path: &Path, key: String) {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => return,
            Ok(_) => {}
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot stat resource");
                return;
            }
        }
        match fs::read(path) {
            Ok(content) if content.is_empty() => {
                debug!(path = %path.display(), "skipping empty resource");
            }
            Ok(content) => {
                debug!(%key, bytes = content.len(), "resource loaded");
                self.storage.store(key, content);
            }
            Err(e) => debug!(path = %path.display(), error = %e, "cannot read resource"),
        }
    }

    /// Target path and key for a path carrying the atomic marker.
    fn strip_marker(&self, path: &Path, key: &str) -> Option<(PathBuf, String)> {
        let marker = self.marker.as_ref()?;
        let raw = path.to_str()?;
        if !marker.is_match(raw) {
            return None;
        }
        Some((
            PathBuf::from(marker.replace(raw, "").into_owned()),
            marker.replace(key, "").into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_utils::eventually;

    const WAIT: Duration = Duration::from_secs(5);

    fn key(k: &str) -> String {
        k.to_string()
    }

    fn pem_loader(dir: &Path) -> ResourceLoader {
        ResourceLoader::new(
            LoaderConfig::new([dir])
                .with_extension("pem")
                .with_key_strategy(KeyStrategy::NameNoExtension),
        )
        .unwrap()
    }

    #[test]
    fn test_validation_order() {
        let dir = tempfile::tempdir().unwrap();

        let none = ResourceLoader::new(LoaderConfig::new(Vec::<PathBuf>::new()));
        assert!(matches!(none, Err(WatchError::NoPathsSpecified)));

        let missing = ResourceLoader::new(LoaderConfig::new(["/no/such/dir"]).with_extension(""));
        assert!(matches!(missing, Err(WatchError::PathDoesNotExist(_))));

        let empty = ResourceLoader::new(LoaderConfig::new([dir.path()]).with_extension(""));
        assert!(matches!(empty, Err(WatchError::EmptyExtension)));

        let needs_ext = ResourceLoader::new(
            LoaderConfig::new([dir.path()]).with_key_strategy(KeyStrategy::NameNoExtension),
        );
        assert!(matches!(needs_ext, Err(WatchError::EmptyExtension)));

        let mut no_store = LoaderConfig::new([dir.path()]).with_atomic_marker("(");
        no_store.storage = None;
        assert!(matches!(
            ResourceLoader::new(no_store),
            Err(WatchError::StorageNotSpecified)
        ));

        let bad_marker = ResourceLoader::new(LoaderConfig::new([dir.path()]).with_atomic_marker("("));
        assert!(matches!(bad_marker, Err(WatchError::InvalidPattern(_))));
    }

    #[test]
    fn test_initial_scan_loads_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("signing.pem"), b"key-material").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        fs::write(dir.path().join("empty.pem"), b"").unwrap();
        fs::create_dir(dir.path().join("dir.pem")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/inner.pem"), b"inner").unwrap();

        let loader = pem_loader(dir.path());
        loader.rescan().unwrap();

        let store = loader.storage();
        assert_eq!(store.get(&key("signing")), Some(b"key-material".to_vec()));
        assert_eq!(store.get(&key("inner")), Some(b"inner".to_vec()));
        assert_eq!(store.get(&key("empty")), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_missing_root_fails_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("gone");
        fs::create_dir(&root).unwrap();
        let mut loader = pem_loader(&root);
        fs::remove_dir(&root).unwrap();

        let result = loader.start_watching();
        assert!(matches!(result, Err(WatchError::InitialScan { .. })));
        assert!(!loader.is_watching());
    }

    #[test]
    fn test_write_overwrites_and_remove_clears() {
        let dir = tempfile::tempdir().unwrap();
        let loader = pem_loader(dir.path());
        let root = loader.roots()[0].clone();
        let file = root.join("signing.pem");

        fs::write(&file, b"v1").unwrap();
        loader.core.handle(&ChangeEvent::new(&file, Op::CREATE));
        fs::write(&file, b"v2").unwrap();
        loader.core.handle(&ChangeEvent::new(&file, Op::WRITE));
        loader.core.handle(&ChangeEvent::new(&file, Op::WRITE));

        let store = loader.storage();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key("signing")), Some(b"v2".to_vec()));

        fs::remove_file(&file).unwrap();
        loader.core.handle(&ChangeEvent::new(&file, Op::REMOVE));
        assert!(store.is_empty());

        loader.core.handle(&ChangeEvent::new(root.join("never.pem"), Op::RENAME));
        assert!(store.is_empty());
    }

    #[test]
    fn test_operation_filter() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ResourceLoader::new(
            LoaderConfig::new([dir.path()])
                .with_key_strategy(KeyStrategy::NameWithExtension)
                .with_ops(Op::CREATE | Op::CHMOD),
        )
        .unwrap();
        let root = loader.roots()[0].clone();
        let file = root.join("a.crt");
        fs::write(&file, b"data").unwrap();

        loader.core.handle(&ChangeEvent::new(&file, Op::WRITE));
        assert!(loader.storage().is_empty());

        loader.core.handle(&ChangeEvent::new(&file, Op::CHMOD));
        assert_eq!(loader.storage().get(&key("a.crt")), Some(b"data".to_vec()));

        loader.core.handle(&ChangeEvent::new(&file, Op::REMOVE));
        assert_eq!(loader.storage().len(), 1);
    }

    #[test]
    fn test_staged_write_loads_target() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ResourceLoader::new(
            LoaderConfig::new([dir.path()]).with_key_strategy(KeyStrategy::NameWithExtension),
        )
        .unwrap();
        let root = loader.roots()[0].clone();
        fs::write(root.join("tls.crt"), b"final").unwrap();

        loader.core.handle(&ChangeEvent::new(root.join("tls.crt~"), Op::WRITE));
        assert_eq!(loader.storage().get(&key("tls.crt")), Some(b"final".to_vec()));
        assert_eq!(loader.storage().get(&key("tls.crt~")), None);

        loader.core.handle(&ChangeEvent::new(root.join("tls.crt~"), Op::RENAME));
        assert_eq!(loader.storage().get(&key("tls.crt")), Some(b"final".to_vec()));
    }

    #[test]
    fn test_staged_copy_without_extension_has_no_key() {
        let dir = tempfile::tempdir().unwrap();
        let loader = pem_loader(dir.path());
        let root = loader.roots()[0].clone();
        fs::write(root.join("signing.pem"), b"final").unwrap();

        loader.core.handle(&ChangeEvent::new(root.join("signing.pem~"), Op::WRITE));
        assert!(loader.storage().is_empty());
    }

    #[test]
    fn test_backup_removal_keeps_live_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("signing.pem"), b"live").unwrap();
        fs::write(root.join("signing.pem~"), b"old").unwrap();
        fs::write(root.join("tls.crt"), b"cert").unwrap();
        fs::write(root.join("tls.crt~"), b"old cert").unwrap();

        let by_stem = pem_loader(&root);
        let by_name = ResourceLoader::new(
            LoaderConfig::new([&root]).with_key_strategy(KeyStrategy::NameWithExtension),
        )
        .unwrap();
        by_stem.rescan().unwrap();
        by_name.rescan().unwrap();

        fs::remove_file(root.join("signing.pem~")).unwrap();
        fs::remove_file(root.join("tls.crt~")).unwrap();
        for loader in [&by_stem, &by_name] {
            loader.core.handle(&ChangeEvent::new(root.join("signing.pem~"), Op::REMOVE));
            loader.core.handle(&ChangeEvent::new(root.join("tls.crt~"), Op::REMOVE));
        }

        assert_eq!(by_stem.storage().get(&key("signing")), Some(b"live".to_vec()));
        assert_eq!(by_name.storage().get(&key("tls.crt")), Some(b"cert".to_vec()));
        assert_eq!(by_name.storage().get(&key("signing.pem")), Some(b"live".to_vec()));
    }

    #[test]
    fn test_extension_ignored_by_other_strategies() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ResourceLoader::new(LoaderConfig::new([dir.path()]).with_extension("pem")).unwrap();
        let root = loader.roots()[0].clone();
        fs::write(root.join("notes.txt"), b"data").unwrap();
        fs::write(root.join("signing.pem"), b"key").unwrap();

        loader.rescan().unwrap();
        let store = loader.storage();
        let full = |name: &str| root.join(name).to_string_lossy().into_owned();
        assert_eq!(store.get(&full("notes.txt")), Some(b"data".to_vec()));
        assert_eq!(store.get(&full("signing.pem")), Some(b"key".to_vec()));
    }

    #[test]
    fn test_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a/b.pem"), b"x").unwrap();
        let loader = ResourceLoader::new(
            LoaderConfig::new([dir.path()]).with_key_strategy(KeyStrategy::PathRelativeToRoot),
        )
        .unwrap();
        loader.rescan().unwrap();
        assert_eq!(loader.storage().get(&key("/a/b.pem")), Some(b"x".to_vec()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_file_isolated() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("good.pem"), b"ok").unwrap();
        let locked = dir.path().join("locked.pem");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let mut loader = pem_loader(dir.path());
        loader.start_watching().unwrap();
        assert!(loader.is_watching());
        let store = loader.storage();
        assert_eq!(store.get(&key("good")), Some(b"ok".to_vec()));
        // Privileged users can still read the file.
        if fs::read(&locked).is_err() {
            assert_eq!(store.get(&key("locked")), None);
            assert_eq!(store.len(), 1);
        }
        loader.stop_watching();
    }

    #[tokio::test]
    async fn test_live_updates() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = ResourceLoader::new(
            LoaderConfig::new([dir.path()])
                .with_extension(".pem")
                .with_key_strategy(KeyStrategy::NameNoExtension)
                .with_subfolders(true),
        )
        .unwrap();
        loader.start_watching().unwrap();
        loader.start_watching().unwrap();
        assert!(loader.is_watching());

        let root = loader.roots()[0].clone();
        let store = loader.storage();
        fs::write(root.join("signing.pem"), b"live").unwrap();
        assert!(eventually(WAIT, || store.get(&key("signing")).is_some()).await);

        fs::create_dir(root.join("sub")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(root.join("sub/deep.pem"), b"deep").unwrap();
        assert!(eventually(WAIT, || store.get(&key("deep")) == Some(b"deep".to_vec())).await);

        fs::remove_file(root.join("signing.pem")).unwrap();
        assert!(eventually(WAIT, || store.get(&key("signing")).is_none()).await);

        loader.stop_watching();
        loader.stop_watching();
        assert!(!loader.is_watching());
        assert_eq!(store.get(&key("deep")), Some(b"deep".to_vec()));
    }
}
