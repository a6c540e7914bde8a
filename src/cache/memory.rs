//! In-process TTL cache.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::app::{CleanwebError, Result};
use crate::cache::ResultCache;
use crate::domain::CacheKey;

struct Entry<V> {
    value: V,
    /// `None` when the ttl is too large to represent
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Cache with TTL-based expiration, safe for concurrent readers and writers
pub struct MemoryCache<V> {
    entries: RwLock<HashMap<CacheKey, Entry<V>>>,
    default_ttl: Duration,
}

impl<V> MemoryCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Clear all cached entries
    pub fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|e| CleanwebError::Cache(e.to_string()))?
            .clear();
        Ok(())
    }
}

impl<V> ResultCache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CleanwebError::Cache(e.to_string()))?;

        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()> {
        let expires_at = Instant::now().checked_add(ttl);

        let mut entries = self
            .entries
            .write()
            .map_err(|e| CleanwebError::Cache(e.to_string()))?;
        entries.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn purge_expired(&self) -> Result<usize> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CleanwebError::Cache(e.to_string()))?;

        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CleanwebError::Cache(e.to_string()))?;
        Ok(entries.len())
    }
}
