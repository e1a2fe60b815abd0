//! Key/value storage the loader writes file contents into.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

/// Thread-safe key/value store.
///
/// Implementations must tolerate concurrent readers while the loader
/// writes; `get` returns an owned copy so no lock outlives the call.
pub trait KeyValueStore<K, V>: Send + Sync {
    /// Look up a value.
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or replace a value.
    fn store(&self, key: K, value: V);

    /// Remove a value. Returns `true` if the key was present.
    fn remove(&self, key: &K) -> bool;

    /// Drop every entry. Returns `true` if anything was removed.
    fn clean(&self) -> bool;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Store type used by the loader: resource key to raw bytes.
pub type SharedStore = Arc<dyn KeyValueStore<String, Vec<u8>>>;

/// In-memory [`KeyValueStore`] backed by a `HashMap`.
#[derive(Debug)]
pub struct MemoryStore<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MemoryStore<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoryStore<K, V> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K, V> MemoryStore<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Copy of every entry, for diagnostics and tests.
    #[must_use]
    pub fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V> KeyValueStore<K, V> for MemoryStore<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn store(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn clean(&self) -> bool {
        let mut entries = self.entries.write();
        let had_entries = !entries.is_empty();
        entries.clear();
        had_entries
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Read-only view over a shared store.
pub struct ReadOnlyStore<K, V> {
    inner: Arc<dyn KeyValueStore<K, V>>,
}

impl<K, V> Clone for ReadOnlyStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> std::fmt::Debug for ReadOnlyStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOnlyStore")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl<K, V> ReadOnlyStore<K, V> {
    /// Wrap a store.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore<K, V>>) -> Self {
        Self { inner }
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
