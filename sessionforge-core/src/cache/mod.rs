//! Bounded resolution caches.
//!
//! - [`BoundedCache`] - in-memory LRU cache with a per-entry TTL
//! - [`DiscoveryCache`] - persisted map that expires as a whole

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

mod discovery;

pub use discovery::{DEFAULT_DISCOVERY_TTL, DiscoveryCache};

/// A cached value and the moment it stops being valid.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    recency: u64,
}

/// Capacity-bounded cache with least-recently-used eviction and absolute
/// per-entry expiry.
///
/// Entries expire `ttl` after they were inserted; reading an entry promotes
/// it to most-recently-used but does not extend its lifetime. The cache never
/// holds more than `capacity` entries.
///
/// Time is read from [`tokio::time::Instant`], so expiry follows a paused
/// test clock.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, CacheEntry<V>>,
    // recency stamp -> key, oldest first
    order: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries (minimum 1) for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a live entry and mark it most recently used.
    ///
    /// Expired entries are evicted and reported as a miss.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let now = Instant::now();
        let expired = self.entries.get(key)?.expires_at <= now;
        if expired {
            self.remove(key);
            return None;
        }

        let stamp = self.stamp();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.recency);
        entry.recency = stamp;
        self.order.insert(stamp, key.clone());
        Some(&entry.value)
    }

    /// Insert or replace an entry, evicting the least recently used entry
    /// first when the cache is full.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.recency);
        }

        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }

        let stamp = self.stamp();
        self.order.insert(stamp, key.clone());
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
                recency: stamp,
            },
        );
    }

    /// Remove an entry, returning its value if it was present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.recency);
        Some(entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }
}
