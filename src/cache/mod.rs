pub mod memory;
pub mod sqlite;

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::app::Result;
use crate::domain::CacheKey;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

/// Default lifetime of a cache entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between expired-entry sweeps
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Typed memoization store with per-entry expiry.
///
/// Expired entries are never returned by `get`, whether or not they have
/// been purged yet.
pub trait ResultCache<V>: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<V>>;
    fn set(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()>;
    fn default_ttl(&self) -> Duration;

    fn set_default(&self, key: &CacheKey, value: &V) -> Result<()> {
        self.set(key, value, self.default_ttl())
    }

    /// Remove expired entries, returning how many were removed
    fn purge_expired(&self) -> Result<usize>;

    /// Number of stored entries, including expired ones not yet purged
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A cache that never stores anything
pub struct NoCache<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> NoCache<V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for NoCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResultCache<V> for NoCache<V> {
    fn get(&self, _key: &CacheKey) -> Result<Option<V>> {
        Ok(None)
    }

    fn set(&self, _key: &CacheKey, _value: &V, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn default_ttl(&self) -> Duration {
        Duration::ZERO
    }

    fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Periodically purge expired entries from `cache`.
///
/// The task holds only a weak reference and exits once the cache is dropped.
/// Must be called from within a Tokio runtime.
pub fn spawn_cleanup<V, C>(cache: &Arc<C>, interval: Duration) -> JoinHandle<()>
where
    V: 'static,
    C: ResultCache<V> + ?Sized + 'static,
{
    let weak = Arc::downgrade(cache);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            match cache.purge_expired() {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired cache entries", n),
                Err(e) => tracing::warn!("Cache cleanup failed: {}", e),
            }
        }

        tracing::debug!("Cache cleanup task stopped");
    })
}
