use super::cached_data::{CacheEntry, FetchOutcome};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Per-fetcher cache whose entries expire after a fixed TTL
#[derive(Debug)]
pub struct ClientCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> ClientCache<T> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry only while it is younger than the TTL.
    pub fn get(&self, key: &str) -> Option<FetchOutcome<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                debug!("🎯 Client cache HIT: {}", key);
                Some(entry.outcome())
            }
            Some(_) => {
                debug!("🔄 Client cache STALE: {}", key);
                None
            }
            None => {
                debug!("❌ Client cache MISS: {}", key);
                None
            }
        }
    }

    pub fn put(&self, key: &str, outcome: &FetchOutcome<T>) {
        debug!("💾 Client cache STORE: {} ({} records)", key, outcome.data.len());
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), CacheEntry::new(outcome));
    }

    /// Removes every entry whose key mentions `component_id`.
    pub fn invalidate_component(&self, component_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !key.contains(component_id));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

type ErasedEntry = Arc<dyn Any + Send + Sync>;

/// Process-side table shared by every fetcher of one context.
///
/// Entries never expire; only invalidation removes them. Fetchers of
/// different record types share the table, so entries are stored
/// type-erased and a type mismatch reads as a miss.
#[derive(Default)]
pub struct ServerCache {
    entries: RwLock<HashMap<String, ErasedEntry>>,
}

impl std::fmt::Debug for ServerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerCache")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ServerCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<FetchOutcome<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let hit = entries
            .get(key)
            .and_then(|entry| entry.downcast_ref::<CacheEntry<T>>())
            .map(CacheEntry::outcome);

        if hit.is_some() {
            debug!("🎯 Server cache HIT: {}", key);
        } else {
            debug!("❌ Server cache MISS: {}", key);
        }
        hit
    }

    pub fn put<T: Clone + Send + Sync + 'static>(&self, key: &str, outcome: &FetchOutcome<T>) {
        info!("💾 Server cache STORE: {} ({} records)", key, outcome.data.len());
        let entry: ErasedEntry = Arc::new(CacheEntry::new(outcome));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }

    /// Removes every entry whose key mentions `component_id`.
    pub fn invalidate_component(&self, component_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| !key.contains(component_id));
        before - entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
