//! Cross-session scope cache.
//! Maps `(tenant, scope, mutation)` to the resolved texts of that scope so a
//! scope is loaded from the store at most once per TTL window.
//! L1: in-memory LRU with TTL (this module). L2: SQLite ([`sqlite`]).

pub mod sqlite;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{CacheError, StoreError};
use crate::record::ScopeTexts;

pub use sqlite::SqliteScopeCache;

/// Computes a scope's texts on a cache miss.
pub type Loader<'a> = dyn FnMut() -> Result<ScopeTexts, StoreError> + 'a;

/// Cache-aside contract used by the resolver.
pub trait ScopeCache: Send + Sync {
    /// Return the cached value for `key`, or run `compute`, store and return its result.
    /// Loader errors are returned and nothing is cached.
    fn load_or_compute(
        &self,
        key: &str,
        compute: &mut Loader<'_>,
    ) -> Result<Arc<ScopeTexts>, CacheError>;
}

/// Cache key of one scope under one mutation.
pub fn scope_cache_key(tenant: &str, scope: &str, mutation: &str) -> String {
    format!("translator|{tenant}|{scope}|{mutation}")
}

/// Digest the textual key into a fixed-size LRU key.
pub fn compute_key(key: &str) -> [u8; 32] {
    *blake3::hash(key.as_bytes()).as_bytes()
}

struct CacheEntry {
    texts: Arc<ScopeTexts>,
    inserted_at: Instant,
}

/// In-memory LRU scope cache with TTL.
/// Concurrent loads of the same key collapse into a single loader call.
pub struct MemoryScopeCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    /// Per-key gates held while a loader runs.
    loading: Mutex<HashMap<[u8; 32], Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl MemoryScopeCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            loading: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a cached scope. Returns None if absent or expired.
    pub fn get(&self, key: &[u8; 32]) -> Option<Arc<ScopeTexts>> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(Arc::clone(&entry.texts));
            }
            cache.pop(key);
        }
        None
    }

    pub fn insert(&self, key: [u8; 32], texts: Arc<ScopeTexts>) {
        self.inner.lock().put(
            key,
            CacheEntry {
                texts,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, e.g. after a bulk import.
    pub fn invalidate_all(&self) {
        self.inner.lock().clear();
    }
}

impl ScopeCache for MemoryScopeCache {
    fn load_or_compute(
        &self,
        key: &str,
        compute: &mut Loader<'_>,
    ) -> Result<Arc<ScopeTexts>, CacheError> {
        let digest = compute_key(key);
        if let Some(hit) = self.get(&digest) {
            debug!(key, "scope cache hit");
            return Ok(hit);
        }

        let gate = Arc::clone(self.loading.lock().entry(digest).or_default());
        let _guard = gate.lock();
        // Another caller may have loaded it while we waited on the gate.
        if let Some(hit) = self.get(&digest) {
            debug!(key, "scope cache hit after wait");
            return Ok(hit);
        }

        debug!(key, "scope cache miss");
        let result = compute();
        let outcome = result.map(|texts| {
            let texts = Arc::new(texts);
            self.insert(digest, Arc::clone(&texts));
            texts
        });
        self.loading.lock().remove(&digest);
        outcome.map_err(CacheError::from)
    }
}
