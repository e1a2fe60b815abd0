//! Low-level path watcher over OS change notifications.
//!
//! A [`PathWatcher`] owns one `notify` handle and one tokio dispatch task.
//! Raw notifications are pushed onto two channels (events, errors) by the
//! notify backend thread; the dispatch task drains both and calls the
//! registered handlers synchronously, so a slow handler delays every later
//! event of the same watcher.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::event::{ChangeEvent, Op, translate};
use crate::guard::call_guarded;
use crate::{WatchError, WatchResult};

/// Callback receiving change events.
pub type EventHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Callback receiving asynchronous watch errors.
pub type ErrorHandler = Arc<dyn Fn(WatchError) + Send + Sync>;

/// Resolve `path` to an absolute, canonical path that exists.
pub(crate) fn resolve_path(path: &Path) -> WatchResult<PathBuf> {
    match path.canonicalize() {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(WatchError::missing(path)),
        Err(source) => Err(WatchError::PathResolution {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Watches a set of paths and dispatches their changes to callbacks.
///
/// Lifecycle: paths are added while unstarted, [`start`](Self::start)
/// opens the OS handle and spawns the dispatch task, [`close`](Self::close)
/// tears both down and makes the watcher startable again.
pub struct PathWatcher {
    roots: Vec<PathBuf>,
    watched: Arc<Mutex<BTreeSet<PathBuf>>>,
    subfolders: bool,
    on_event: Option<EventHandler>,
    on_error: Option<ErrorHandler>,
    running: Option<Running>,
}

struct Running {
    _watcher: Arc<Mutex<RecommendedWatcher>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for PathWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathWatcher")
            .field("roots", &self.roots)
            .field("subfolders", &self.subfolders)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl Default for PathWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PathWatcher {
    /// Create an unstarted watcher with no paths and no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            watched: Arc::new(Mutex::new(BTreeSet::new())),
            subfolders: false,
            on_event: None,
            on_error: None,
            running: None,
        }
    }

    /// Also watch every directory below the registered roots, including
    /// directories created while running.
    #[must_use]
    pub const fn watch_subfolders(mut self, enabled: bool) -> Self {
        self.subfolders = enabled;
        self
    }

    /// Set the event handler. Without one, events are dropped.
    #[must_use]
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(handler));
        self
    }

    /// Set the error handler. Without one, errors are dropped.
    #[must_use]
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(WatchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Register a path and return its resolved absolute form.
    ///
    /// # Errors
    ///
    /// [`WatchError::AlreadyStarted`] while running,
    /// [`WatchError::PathDoesNotExist`] if the path is missing.
    pub fn add_path(&mut self, path: impl AsRef<Path>) -> WatchResult<PathBuf> {
        if self.is_started() {
            return Err(WatchError::AlreadyStarted);
        }
        let resolved = resolve_path(path.as_ref())?;
        if !self.roots.contains(&resolved) {
            self.roots.push(resolved.clone());
            self.watched.lock().insert(resolved.clone());
        }
        Ok(resolved)
    }

    /// Open the OS watch handle and spawn the dispatch task.
    ///
    /// Starting an already running watcher replaces its handle and task.
    ///
    /// # Errors
    ///
    /// [`WatchError::NoPathsConfigured`] with an empty watch set,
    /// [`WatchError::NoRuntime`] outside a tokio runtime, or
    /// [`WatchError::Notify`] if a path cannot be watched.
    pub fn start(&mut self) -> WatchResult<()> {
        if self.roots.is_empty() {
            return Err(WatchError::NoPathsConfigured);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        self.close();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Send failures mean the dispatch task is gone; nothing to do.
            match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    let _ = error_tx.send(err);
                }
            }
        })?;

        let paths = self.expand();
        for path in &paths {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }
        let watched_count = paths.len();
        *self.watched.lock() = paths;

        let watcher = Arc::new(Mutex::new(watcher));
        let dispatcher = Dispatcher {
            watcher: Arc::downgrade(&watcher),
            watched: Arc::clone(&self.watched),
            subfolders: self.subfolders,
            on_event: self.on_event.clone(),
            on_error: self.on_error.clone(),
        };
        let task = runtime.spawn(dispatcher.run(event_rx, error_rx));
        self.running = Some(Running {
            _watcher: watcher,
            task,
        });

        info!(
            roots = self.roots.len(),
            watched = watched_count,
            subfolders = self.subfolders,
            "path watcher started"
        );
        Ok(())
    }

    /// Release the OS handle and stop dispatching. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
            *self.watched.lock() = self.roots.iter().cloned().collect();
            debug!(roots = self.roots.len(), "path watcher closed");
        }
    }

    /// Whether the watcher is running.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// The explicitly registered roots.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Snapshot of every path currently in the watch set, including
    /// discovered subfolders.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    fn expand(&self) -> BTreeSet<PathBuf> {
        let mut set: BTreeSet<PathBuf> = self.roots.iter().cloned().collect();
        if self.subfolders {
            for root in &self.roots {
                set.extend(subdirectories(root, 1));
            }
        }
        set
    }
}

impl Drop for PathWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Every directory under `root` at `min_depth` or deeper.
fn subdirectories(root: &Path, min_depth: usize) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(min_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_dir() => Some(entry.into_path()),
            Ok(_) => None,
            Err(e) => {
                debug!(root = %root.display(), error = %e, "skipping unreadable entry");
                None
            }
        })
        .collect()
}

struct Dispatcher {
    watcher: Weak<Mutex<RecommendedWatcher>>,
    watched: Arc<Mutex<BTreeSet<PathBuf>>>,
    subfolders: bool,
    on_event: Option<EventHandler>,
    on_error: Option<ErrorHandler>,
}

impl Dispatcher {
    async fn run(
        self,
        mut events: UnboundedReceiver<notify::Event>,
        mut errors: UnboundedReceiver<notify::Error>,
    ) {
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.dispatch_event(event),
                Some(err) = errors.recv() => self.dispatch_error(err),
                else => break,
            }
        }
        debug!("path watcher dispatch loop finished");
    }

    fn dispatch_event(&self, raw: notify::Event) {
        for change in translate(raw) {
            if self.subfolders && change.op == Op::CREATE && change.path.is_dir() {
                self.absorb_directory(&change.path);
                continue;
            }
            if let Some(handler) = &self.on_event {
                call_guarded("path watcher event handler", || handler(change));
            }
        }
    }

    fn dispatch_error(&self, err: notify::Error) {
        debug!(error = %err, "path watcher error");
        if let Some(handler) = &self.on_error {
            call_guarded("path watcher error handler", || {
                handler(WatchError::Notify(err));
            });
        }
    }

    fn absorb_directory(&self, dir: &Path) {
        let Some(watcher) = self.watcher.upgrade() else {
            return;
        };
        let mut watcher = watcher.lock();
        let mut watched = self.watched.lock();
        for path in subdirectories(dir, 0) {
            if watched.contains(&path) {
                continue;
            }
            match watcher.watch(&path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    debug!(path = %path.display(), "watching new directory");
                    watched.insert(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to watch new directory"),
            }
        }
    }
}
