//! Debounced, rate-limited batching of change events.
//!
//! Each incoming event is filed under its watch root. A token from the
//! rate limiter flushes every pending batch at once; independently, every
//! event re-arms a debounce timer that flushes once the stream goes quiet
//! for one interval. The limiter bounds latency under sustained load and
//! the timer coalesces bursts. Errors travel through a second lane with
//! its own lock, limiter and timer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::ChangeEvent;
use crate::guard::call_guarded;
use crate::path_watcher::PathWatcher;
use crate::rate_limiter::RateLimiter;
use crate::{WatchError, WatchResult};

/// Callback receiving one root's batch of events.
pub type BatchHandler = Arc<dyn Fn(&Path, &[ChangeEvent]) + Send + Sync>;

/// Callback signalling that something changed, without details.
pub type ChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving a batch of watch errors.
pub type ErrorBatchHandler = Arc<dyn Fn(&[WatchError]) + Send + Sync>;

/// Throttle settings shared by the event and error lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Debounce period and limiter refill interval
    #[serde(with = "sdk_common::duration_ms")]
    pub interval: Duration,
    /// Immediate flushes allowed per interval; zero means debounce only
    pub burst: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            burst: 1,
        }
    }
}

/// Configuration for a [`BatchNotifier`].
#[derive(Clone, Default)]
pub struct NotifierConfig {
    /// Watch roots
    pub paths: Vec<PathBuf>,
    /// Debounce / rate-limit settings
    pub throttle: ThrottleConfig,
    /// Watch subdirectories of the roots as well
    pub watch_subfolders: bool,
    on_batch: Option<BatchHandler>,
    on_change: Option<ChangeHandler>,
    on_errors: Option<ErrorBatchHandler>,
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("paths", &self.paths)
            .field("throttle", &self.throttle)
            .field("watch_subfolders", &self.watch_subfolders)
            .field("on_batch", &self.on_batch.is_some())
            .field("on_change", &self.on_change.is_some())
            .field("on_errors", &self.on_errors.is_some())
            .finish()
    }
}

impl NotifierConfig {
    /// Create a config for the given roots.
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

    /// Set the debounce period / limiter interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.throttle.interval = interval;
        self
    }

    /// Set the number of immediate flushes allowed per interval.
    #[must_use]
    pub const fn with_burst(mut self, burst: u32) -> Self {
        self.throttle.burst = burst;
        self
    }

    /// Replace both throttle settings.
    #[must_use]
    pub const fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    /// Watch subdirectories as well.
    #[must_use]
    pub const fn with_subfolders(mut self, enabled: bool) -> Self {
        self.watch_subfolders = enabled;
        self
    }

    /// Deliver detailed batches, one call per root.
    #[must_use]
    pub fn on_batch<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Path, &[ChangeEvent]) + Send + Sync + 'static,
    {
        self.on_batch = Some(Arc::new(handler));
        self
    }

    /// Deliver a bare "something changed" signal. Ignored when a batch
    /// handler is set.
    #[must_use]
    pub fn on_change<F>(mut self, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(handler));
        self
    }

    /// Deliver batched watch errors.
    #[must_use]
    pub fn on_errors<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[WatchError]) + Send + Sync + 'static,
    {
        self.on_errors = Some(Arc::new(handler));
        self
    }
}

/// Batches change events from a [`PathWatcher`] and delivers them once
/// traffic quiesces.
pub struct BatchNotifier {
    shared: Arc<Shared>,
    watcher: PathWatcher,
}

impl std::fmt::Debug for BatchNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchNotifier")
            .field("roots", &self.shared.roots)
            .field("interval", &self.shared.interval)
            .field("watcher", &self.watcher)
            .finish_non_exhaustive()
    }
}

impl BatchNotifier {
    /// Validate the config and build an unstarted notifier.
    ///
    /// # Errors
    ///
    /// [`WatchError::NoPathsSpecified`] without paths,
    /// [`WatchError::PathDoesNotExist`] for a missing path.
    pub fn new(config: NotifierConfig) -> WatchResult<Self> {
        if config.paths.is_empty() {
            return Err(WatchError::NoPathsSpecified);
        }

        let mut watcher = PathWatcher::new().watch_subfolders(config.watch_subfolders);
        let roots = config
            .paths
            .iter()
            .map(|p| watcher.add_path(p))
            .collect::<WatchResult<Vec<_>>>()?;

        let ThrottleConfig { interval, burst } = config.throttle;
        let shared = Arc::new(Shared {
            roots,
            interval,
            on_batch: config.on_batch,
            on_change: config.on_change,
            on_errors: config.on_errors,
            events: Lane::new(interval, burst),
            errors: Lane::new(interval, burst),
        });

        let on_event = Arc::downgrade(&shared);
        let on_error = Arc::downgrade(&shared);
        let watcher = watcher
            .on_event(move |event| {
                if let Some(shared) = on_event.upgrade() {
                    Shared::push_event(&shared, event);
                }
            })
            .on_error(move |err| {
                if let Some(shared) = on_error.upgrade() {
                    Shared::push_error(&shared, err);
                }
            });

        Ok(Self { shared, watcher })
    }

    /// Start the underlying watcher.
    ///
    /// # Errors
    ///
    /// Propagates [`PathWatcher::start`] failures.
    pub fn start_watching(&mut self) -> WatchResult<()> {
        self.watcher.start()
    }

    /// Stop the underlying watcher and drop anything still pending. Safe to
    /// call repeatedly.
    pub fn stop_watching(&mut self) {
        self.watcher.close();
        self.shared.events.reset();
        self.shared.errors.reset();
    }

    /// Whether the watcher is running.
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.watcher.is_started()
    }

    /// The resolved watch roots.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.shared.roots
    }

    #[cfg(test)]
    fn inject(&self, event: ChangeEvent) {
        Shared::push_event(&self.shared, event);
    }

    #[cfg(test)]
    fn inject_error(&self, err: WatchError) {
        Shared::push_error(&self.shared, err);
    }
}

impl Drop for BatchNotifier {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

type PendingEvents = BTreeMap<PathBuf, Vec<ChangeEvent>>;

struct Shared {
    roots: Vec<PathBuf>,
    interval: Duration,
    on_batch: Option<BatchHandler>,
    on_change: Option<ChangeHandler>,
    on_errors: Option<ErrorBatchHandler>,
    events: Lane<PendingEvents>,
    errors: Lane<Vec<WatchError>>,
}

impl Shared {
    const fn event_lane(&self) -> &Lane<PendingEvents> {
        &self.events
    }

    const fn error_lane(&self) -> &Lane<Vec<WatchError>> {
        &self.errors
    }

    fn push_event(this: &Arc<Self>, event: ChangeEvent) {
        let root = this.root_for(&event.path);
        let mut pending = this.events.pending.lock();
        pending.entry(root).or_default().push(event);
        if this.events.limiter.try_acquire() {
            this.deliver_events(&mut pending);
        }
        drop(pending);
        Lane::arm(this, Self::event_lane, Self::flush_events);
    }

    fn push_error(this: &Arc<Self>, err: WatchError) {
        let mut pending = this.errors.pending.lock();
        pending.push(err);
        if this.errors.limiter.try_acquire() {
            this.deliver_errors(&mut pending);
        }
        drop(pending);
        Lane::arm(this, Self::error_lane, Self::flush_errors);
    }

    fn flush_events(&self) {
        let mut pending = self.events.pending.lock();
        self.deliver_events(&mut pending);
    }

    fn flush_errors(&self) {
        let mut pending = self.errors.pending.lock();
        self.deliver_errors(&mut pending);
    }

    /// Runs with the event lock held so batches leave in arrival order.
    fn deliver_events(&self, pending: &mut PendingEvents) {
        if pending.values().all(Vec::is_empty) {
            return;
        }
        let batches = std::mem::take(pending);
        if let Some(handler) = &self.on_batch {
            for (root, events) in batches.iter().filter(|(_, e)| !e.is_empty()) {
                debug!(root = %root.display(), events = events.len(), "flushing event batch");
                call_guarded("batch handler", || handler(root, events));
            }
        } else if let Some(handler) = &self.on_change {
            debug!(roots = batches.len(), "flushing change signal");
            call_guarded("change handler", || handler());
        }
    }

    fn deliver_errors(&self, pending: &mut Vec<WatchError>) {
        if pending.is_empty() {
            return;
        }
        let errors = std::mem::take(pending);
        match &self.on_errors {
            Some(handler) => {
                call_guarded("error batch handler", || handler(&errors));
            }
            None => warn!(errors = errors.len(), "dropping watch errors without handler"),
        }
    }

    /// Nearest registered root at or above `path`, falling back to the
    /// path's parent directory.
    fn root_for(&self, path: &Path) -> PathBuf {
        path.ancestors()
            .find(|candidate| self.roots.iter().any(|root| root == candidate))
            .or_else(|| path.parent())
            .unwrap_or(path)
            .to_path_buf()
    }
}

/// Pending items plus the limiter and debounce timer guarding their flush.
struct Lane<T> {
    pending: Mutex<T>,
    limiter: RateLimiter,
    timer: Mutex<Timer>,
}

#[derive(Default)]
struct Timer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl<T: Default + Send + 'static> Lane<T> {
    fn new(interval: Duration, burst: u32) -> Self {
        Self {
            pending: Mutex::new(T::default()),
            limiter: RateLimiter::new(interval, burst),
            timer: Mutex::new(Timer::default()),
        }
    }

    /// (Re)arm the lane's debounce timer. A timer only flushes if nothing
    /// re-armed or reset the lane since it was scheduled.
    fn arm(shared: &Arc<Shared>, lane: fn(&Shared) -> &Self, flush: fn(&Shared)) {
        let mut timer = lane(shared).timer.lock();
        timer.generation = timer.generation.wrapping_add(1);
        if let Some(task) = timer.task.take() {
            task.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            drop(timer);
            debug!("no tokio runtime for debounce timer, flushing now");
            flush(shared);
            return;
        };

        let generation = timer.generation;
        let delay = shared.interval;
        let weak: Weak<Shared> = Arc::downgrade(shared);
        timer.task = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let current = lane(&shared).timer.lock().generation;
            if current == generation {
                flush(&shared);
            }
        }));
    }

    fn reset(&self) {
        let mut timer = self.timer.lock();
        timer.generation = timer.generation.wrapping_add(1);
        if let Some(task) = timer.task.take() {
            task.abort();
        }
        drop(timer);
        *self.pending.lock() = T::default();
    }
}
