//! L2 persistent scope cache backed by SQLite.
//! TTL: 7 days. Key: blake3 digest (same as L1). Survives process restarts,
//! so resolved scopes are shared across sessions and runs.
//! Concurrent misses for one key may both query the store; the last write wins.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{compute_key, Loader, ScopeCache};
use crate::error::CacheError;
use crate::record::ScopeTexts;

/// Default TTL for L2 cache entries: 7 days.
const DEFAULT_TTL_SECS: u64 = 7 * 24 * 3600;

pub struct SqliteScopeCache {
    conn: Mutex<Connection>,
    ttl_secs: u64,
}

impl SqliteScopeCache {
    /// Open (or create) the SQLite cache database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let cache = Self::with_connection(conn)?;
        info!(path = %db_path.display(), "SQLite scope cache opened");
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS scope_cache (
                cache_key BLOB PRIMARY KEY,
                texts TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scope_cache_created
                ON scope_cache(created_at);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_secs: DEFAULT_TTL_SECS,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    /// Look up a cached scope by digest. Returns None if absent, expired or undecodable.
    pub fn get(&self, key: &[u8; 32]) -> Option<ScopeTexts> {
        let conn = self.conn.lock();
        let cutoff = now_unix() - self.ttl_secs as i64;

        let raw: Option<String> = conn
            .query_row(
                "SELECT texts FROM scope_cache WHERE cache_key = ?1 AND created_at > ?2",
                params![key.as_slice(), cutoff],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();

        match serde_json::from_str(&raw?) {
            Ok(texts) => {
                debug!("L2 scope cache hit");
                Some(texts)
            }
            Err(e) => {
                warn!(error = %e, "L2 scope cache entry undecodable, ignoring");
                None
            }
        }
    }

    pub fn insert(&self, key: &[u8; 32], texts: &ScopeTexts) {
        let encoded = match serde_json::to_string(texts) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "L2 scope cache encode failed");
                return;
            }
        };
        let conn = self.conn.lock();
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO scope_cache (cache_key, texts, created_at)
             VALUES (?1, ?2, ?3)",
            params![key.as_slice(), encoded, now_unix()],
        ) {
            warn!(error = %e, "L2 scope cache insert failed");
        }
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) -> usize {
        let conn = self.conn.lock();
        let cutoff = now_unix() - self.ttl_secs as i64;
        match conn.execute(
            "DELETE FROM scope_cache WHERE created_at <= ?1",
            params![cutoff],
        ) {
            Ok(count) => {
                if count > 0 {
                    info!(removed = count, "L2 scope cache cleanup");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "L2 scope cache cleanup failed");
                0
            }
        }
    }

    /// Drop every entry, e.g. after a bulk import.
    pub fn invalidate_all(&self) {
        if let Err(e) = self.conn.lock().execute("DELETE FROM scope_cache", []) {
            warn!(error = %e, "L2 scope cache invalidation failed");
        }
    }
}

impl ScopeCache for SqliteScopeCache {
    fn load_or_compute(
        &self,
        key: &str,
        compute: &mut Loader<'_>,
    ) -> Result<Arc<ScopeTexts>, CacheError> {
        let digest = compute_key(key);
        if let Some(texts) = self.get(&digest) {
            return Ok(Arc::new(texts));
        }
        let texts = compute()?;
        self.insert(&digest, &texts);
        Ok(Arc::new(texts))
    }
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let cache = SqliteScopeCache::open(&path).unwrap();
            cache
                .load_or_compute("k", &mut || {
                    Ok(ScopeTexts::from([("a.b".to_string(), "x".to_string())]))
                })
                .unwrap();
        }
        let cache = SqliteScopeCache::open(&path).unwrap();
        let mut called = false;
        let texts = cache
            .load_or_compute("k", &mut || {
                called = true;
                Ok(ScopeTexts::new())
            })
            .unwrap();
        assert!(!called);
        assert_eq!(texts.get("a.b").map(String::as_str), Some("x"));
    }

    #[test]
    fn cleanup_removes_expired_entries() {
        let cache = SqliteScopeCache::open_in_memory()
            .unwrap()
            .with_ttl(Duration::ZERO);
        cache.insert(&compute_key("k"), &ScopeTexts::new());
        assert!(cache.get(&compute_key("k")).is_none());
        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn invalidate_forces_reload() {
        let cache = SqliteScopeCache::open_in_memory().unwrap();
        cache.insert(&compute_key("k"), &ScopeTexts::new());
        assert!(cache.get(&compute_key("k")).is_some());
        cache.invalidate_all();
        assert!(cache.get(&compute_key("k")).is_none());
    }
}
