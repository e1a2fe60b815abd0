//! Filesystem-watch live-reload pipeline.
//!
//! Layers, leaves first:
//! - [`PathWatcher`]: OS change notifications for a set of paths, with
//!   optional recursive expansion, dispatched on one tokio task
//! - [`BatchNotifier`]: debounced, rate-limited batching of those events
//! - [`ResourceLoader`]: files mapped to keys and kept in a
//!   [`KeyValueStore`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod guard;
pub mod key;
pub mod loader;
pub mod notifier;
pub mod path_watcher;
pub mod rate_limiter;
pub mod store;

pub use error::{WatchError, WatchResult};
pub use event::{ChangeEvent, Op};
pub use guard::call_guarded;
pub use key::{KeyResolver, KeyStrategy};
pub use loader::{LoaderConfig, ResourceLoader};
pub use notifier::{BatchNotifier, NotifierConfig, ThrottleConfig};
pub use path_watcher::PathWatcher;
pub use rate_limiter::RateLimiter;
pub use store::{KeyValueStore, MemoryStore, ReadOnlyStore, SharedStore};
