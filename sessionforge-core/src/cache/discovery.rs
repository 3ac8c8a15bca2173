//! Persisted discovery cache.
//!
//! Stores the results of expensive discovery sweeps (for example, which
//! direct-message channel belongs to which user) between runs. The file
//! expires as a whole: once it is older than its TTL every entry is dropped,
//! there is no per-entry invalidation.
//!
//! # File Format
//!
//! ```json
//! { "entries": { "U123": "D456" }, "updatedAt": 1714557600000 }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_write;

/// Default lifetime of a discovery cache file.
pub const DEFAULT_DISCOVERY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscoveryFile<V> {
    entries: BTreeMap<String, V>,
    updated_at: i64,
}

/// A string-keyed map persisted to disk with whole-file expiry.
#[derive(Debug, Clone)]
pub struct DiscoveryCache<V> {
    path: PathBuf,
    ttl: Duration,
    entries: BTreeMap<String, V>,
    updated_at: Option<i64>,
}

impl<V> DiscoveryCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Load the cache at `path`.
    ///
    /// A missing, malformed or stale file yields an empty cache; none of
    /// these are errors.
    pub fn load(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        let path = path.into();
        let mut cache = Self {
            path,
            ttl,
            entries: BTreeMap::new(),
            updated_at: None,
        };

        let contents = match fs::read_to_string(&cache.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return cache,
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), "Failed to read discovery cache: {}", e);
                return cache;
            }
        };

        let file: DiscoveryFile<V> = match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), "Discarding malformed discovery cache: {}", e);
                return cache;
            }
        };

        if is_stale(file.updated_at, ttl) {
            tracing::debug!(path = %cache.path.display(), "Discovery cache expired, starting empty");
            return cache;
        }

        cache.entries = file.entries;
        cache.updated_at = Some(file.updated_at);
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the in-memory contents have outlived the TTL since the last save.
    pub fn is_stale(&self) -> bool {
        self.updated_at
            .map(|at| is_stale(at, self.ttl))
            .unwrap_or(true)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.updated_at = None;
    }

    /// Write the cache to disk, stamping it with the current time.
    pub fn save(&mut self) -> io::Result<()> {
        let now = Utc::now().timestamp_millis();
        let file = DiscoveryFile {
            entries: self.entries.clone(),
            updated_at: now,
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        atomic_write(&self.path, json)?;
        self.updated_at = Some(now);
        Ok(())
    }
}

fn is_stale(updated_at_ms: i64, ttl: Duration) -> bool {
    let age_ms = Utc::now().timestamp_millis().saturating_sub(updated_at_ms);
    age_ms < 0 || age_ms as u128 > ttl.as_millis()
}
