//! Bounded TTL store backing a single cache namespace.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;

/// A cached entry with TTL support.
///
/// The payload is wrapped in `Arc` so a cache hit clones a pointer, not
/// a potentially large JSON document.
struct StoredEntry {
    value: Arc<Value>,
    expires_at: Instant,
    /// Microseconds since store creation, refreshed on every hit.
    last_touched: AtomicU64,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently in the store.
    pub size: usize,
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Entries removed by TTL expiry or capacity pressure.
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory TTL store for one namespace.
///
/// `get` never returns an expired value: expired entries are removed the
/// moment a read observes them. When the store is full, `set` makes room
/// by sweeping expired entries first and then dropping the
/// least-recently-touched ones. The eviction order is an approximation;
/// callers must not rely on it beyond "old entries go first".
pub struct NamespaceStore {
    entries: DashMap<String, StoredEntry>,
    default_ttl: Duration,
    max_entries: usize,
    started: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl NamespaceStore {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
            started: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a value. Returns `None` if the key is missing or expired.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                entry.last_touched.store(self.clock_us(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(Arc::clone(&entry.value));
            }
            // Expired entry, remove it
            drop(entry);
            self.entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite a value under the store's default TTL.
    pub fn set(&self, key: &str, value: Arc<Value>) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Insert or overwrite a value with an explicit TTL.
    ///
    /// Overwrites reset the TTL clock; there is no partial merge.
    pub fn set_with_ttl(&self, key: &str, value: Arc<Value>, ttl: Duration) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            self.make_room();
        }

        let entry = StoredEntry {
            value,
            expires_at: Instant::now() + ttl,
            last_touched: AtomicU64::new(self.clock_us()),
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove a single key. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching the pattern. Returns the number removed.
    pub fn remove_pattern(&self, pattern: &Regex) -> usize {
        let doomed: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| pattern.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in doomed {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// Drop every entry. Returns the number removed.
    pub fn flush(&self) -> usize {
        let size = self.entries.len();
        self.entries.clear();
        size
    }

    /// Remove expired entries eagerly. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn clock_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    /// Evict until there is room for one more entry: expired entries
    /// first, then the least-recently-touched.
    fn make_room(&self) {
        self.cleanup_expired();

        while self.entries.len() >= self.max_entries {
            let coldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_touched.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            match coldest {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %key, "evicted for capacity");
                    }
                }
                None => break,
            }
        }
    }
}
