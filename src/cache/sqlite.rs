use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app::{CleanwebError, Result};
use crate::cache::ResultCache;
use crate::domain::CacheKey;

/// Expiry stored when the ttl does not fit a four-digit year
const NEVER_EXPIRES: &str = "9999-12-31T23:59:59.999Z";

/// Persistent cache storing JSON-encoded values in SQLite.
///
/// Expiry timestamps are fixed-width RFC 3339 strings in UTC, so they
/// compare correctly as text.
pub struct SqliteCache<V> {
    conn: Mutex<Connection>,
    default_ttl: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<V> SqliteCache<V> {
    pub fn new<P: AsRef<Path>>(path: P, default_ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CleanwebError::Cache(format!(
                    "Failed to create cache directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn, default_ttl)
    }

    pub fn in_memory(default_ttl: Duration) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, default_ttl)
    }

    fn with_connection(conn: Connection, default_ttl: Duration) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
            default_ttl,
            _marker: PhantomData,
        };
        cache.run_migrations()?;
        Ok(cache)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| CleanwebError::Cache(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CleanwebError::Cache(e.to_string()))
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn expiry(ttl: Duration) -> String {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .filter(|at| at.year() <= 9999)
        .map(timestamp)
        .unwrap_or_else(|| NEVER_EXPIRES.to_string())
}

impl<V> ResultCache<V> for SqliteCache<V>
where
    V: Serialize + DeserializeOwned,
{
    fn get(&self, key: &CacheKey) -> Result<Option<V>> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key.as_str(), timestamp(Utc::now())],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &CacheKey, value: &V, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (key, value, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.as_str(), json, expiry(ttl), timestamp(Utc::now())],
        )?;
        Ok(())
    }

    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![timestamp(Utc::now())],
        )?;
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}
