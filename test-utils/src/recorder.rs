//! Callback recorders and polling helpers for asynchronous assertions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Collects values passed to a callback so tests can inspect them later.
#[derive(Debug)]
pub struct Recorder<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Send + 'static> Recorder<T> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that appends every value it receives.
    #[must_use]
    pub fn sink(&self) -> impl Fn(T) + Send + Sync + 'static {
        let items = Arc::clone(&self.items);
        move |item| items.lock().push(item)
    }

    /// Number of recorded values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    /// Copy of every recorded value, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }
}

/// Poll `check` until it returns `true` or `timeout` elapses.
///
/// Returns the final outcome so callers can `assert!` on it.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
