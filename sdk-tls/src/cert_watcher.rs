//! Hot-reloading TLS material with retries and change callbacks.
//!
//! A [`CertWatcher`] pairs a [`CertConfigWatcher`] with a [`BatchNotifier`]
//! over the same directory. Once a burst of changes settles it rebuilds the
//! [`TlsConfiguration`] under the configured retry policy, publishes it
//! through an `ArcSwapOption` and hands the outcome to every subscriber.
//! A failed reload keeps serving the previous material.

use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sdk_common::RetryPolicy;
use sdk_watch::{BatchNotifier, NotifierConfig, call_guarded};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::MtlsConfig;
use crate::config_watcher::CertConfigWatcher;
use crate::error::CertResult;
use crate::material::TlsConfiguration;
use crate::resolver::ReloadingResolver;

/// Outcome of one reload as seen by subscribers.
pub type ReloadOutcome = CertResult<Arc<TlsConfiguration>>;

/// Callback invoked after every reload attempt.
pub type ReloadCallback = Arc<dyn Fn(&ReloadOutcome) + Send + Sync>;

/// Reload bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadStatus {
    /// When the last reload finished, successful or not
    pub last_attempt: Option<DateTime<Utc>>,
    /// When material was last loaded successfully
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the most recent failure, cleared on success
    pub last_error: Option<String>,
    /// Successful reloads
    pub reloads: u64,
    /// Failed reloads (after retries)
    pub failures: u64,
}

/// Keeps TLS material current and notifies subscribers of each reload.
pub struct CertWatcher {
    inner: Arc<Inner>,
    notifier: BatchNotifier,
}

impl std::fmt::Debug for CertWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertWatcher")
            .field("status", &*self.inner.status.lock())
            .field("subscribers", &self.inner.callbacks.read().len())
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl CertWatcher {
    /// Build an unstarted watcher over `config.cert_dir`.
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`](crate::CertError::Watch) if the directory does
    /// not exist.
    pub fn new(config: &MtlsConfig) -> CertResult<Self> {
        Self::from_source(CertConfigWatcher::new(config)?, config)
    }

    /// Build a watcher around an existing [`CertConfigWatcher`].
    ///
    /// # Errors
    ///
    /// [`CertError::Watch`](crate::CertError::Watch) if the directory does
    /// not exist.
    pub fn from_source(source: CertConfigWatcher, config: &MtlsConfig) -> CertResult<Self> {
        let inner = Arc::new(Inner {
            source: Mutex::new(source),
            callbacks: RwLock::new(Vec::new()),
            current: Arc::new(ArcSwapOption::empty()),
            status: Mutex::new(ReloadStatus::default()),
            retry: RetryPolicy::new(config.retry.clone()),
            reload_lock: tokio::sync::Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        let notifier = BatchNotifier::new(
            NotifierConfig::new([&config.cert_dir])
                .with_throttle(config.throttle)
                .with_subfolders(config.watch_subfolders)
                .on_change(move || schedule_reload(&weak)),
        )?;

        Ok(Self { inner, notifier })
    }

    /// Start watching and run the initial load.
    ///
    /// The watcher keeps running even if the initial load fails; the next
    /// change triggers another attempt.
    ///
    /// # Errors
    ///
    /// A watch error if watching cannot start, otherwise the initial
    /// reload's error.
    pub async fn start(&mut self) -> ReloadOutcome {
        self.inner.source.lock().start()?;
        if !self.notifier.is_watching() {
            self.notifier.start_watching()?;
        }
        info!(roots = ?self.notifier.roots(), "certificate watcher started");
        self.inner.reload().await
    }

    /// Stop watching. Loaded material stays available.
    pub fn stop(&mut self) {
        self.notifier.stop_watching();
        self.inner.source.lock().stop();
    }

    /// Rebuild the configuration now.
    ///
    /// # Errors
    ///
    /// The last error once retries are exhausted. Subscribers receive the
    /// same outcome.
    pub async fn reload(&self) -> ReloadOutcome {
        self.inner.reload().await
    }

    /// Register a callback for every future reload outcome.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&ReloadOutcome) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().push(Arc::new(callback));
    }

    /// Most recently loaded material.
    #[must_use]
    pub fn current(&self) -> Option<Arc<TlsConfiguration>> {
        self.inner.current.load_full()
    }

    /// Snapshot of reload bookkeeping.
    #[must_use]
    pub fn status(&self) -> ReloadStatus {
        self.inner.status.lock().clone()
    }

    /// A rustls resolver that always serves the current certificate.
    #[must_use]
    pub fn resolver(&self) -> Arc<ReloadingResolver> {
        Arc::new(ReloadingResolver::new(Arc::clone(&self.inner.current)))
    }

    /// Whether change notifications are being watched.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.notifier.is_watching()
    }
}

impl Drop for CertWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn schedule_reload(inner: &Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                // Outcome is recorded and delivered to subscribers.
                let _ = inner.reload().await;
            });
        }
        Err(_) => warn!("certificate change observed without a tokio runtime, reload skipped"),
    }
}

struct Inner {
    source: Mutex<CertConfigWatcher>,
    callbacks: RwLock<Vec<ReloadCallback>>,
    current: Arc<ArcSwapOption<TlsConfiguration>>,
    status: Mutex<ReloadStatus>,
    retry: RetryPolicy,
    reload_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    async fn reload(&self) -> ReloadOutcome {
        let _serial = self.reload_lock.lock().await;
        let outcome = self
            .retry
            .execute(|| async { self.assemble() })
            .await
            .map(Arc::new);

        self.record(&outcome);
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            call_guarded("certificate reload callback", || callback(&outcome));
        }
        outcome
    }

    fn assemble(&self) -> CertResult<TlsConfiguration> {
        let source = self.source.lock();
        source.refresh()?;
        source.get()
    }

    fn record(&self, outcome: &ReloadOutcome) {
        let now = Utc::now();
        let mut status = self.status.lock();
        status.last_attempt = Some(now);
        match outcome {
            Ok(tls) => {
                self.current.store(Some(Arc::clone(tls)));
                status.last_success = Some(now);
                status.last_error = None;
                status.reloads += 1;
                info!(reloads = status.reloads, "TLS material reloaded");
            }
            Err(e) => {
                status.last_error = Some(e.to_string());
                status.failures += 1;
                error!(error = %e, failures = status.failures, "TLS reload failed, keeping previous material");
            }
        }
    }
}
