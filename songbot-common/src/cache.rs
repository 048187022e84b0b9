//! Per-session query cache
//!
//! Maps (session, normalized query) to the result set of a previous search so
//! repeated queries skip the external lookup.
//!
//! Eviction is strictly by insertion order: lookups never refresh an entry,
//! re-inserting a key moves it to the most recent position. Entries older
//! than the TTL are dropped when they are next looked up (or purged by the
//! sweeper).

use crate::types::{ResultSet, SessionId};
use crate::{Error, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cache key: one chat plus its normalized query text
///
/// Identical text from two chats gives two independent keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub session: SessionId,
    pub query: String,
}

impl CacheKey {
    pub fn new(session: SessionId, query: &str) -> Self {
        Self {
            session,
            query: normalize_query(query),
        }
    }
}

/// Trim, collapse internal whitespace and lowercase
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct CacheEntry {
    inserted_at: Instant,
    results: ResultSet,
}

/// Shared handle to the query cache
///
/// Clones refer to the same store. Every operation runs in one critical
/// section so eviction order stays consistent under concurrent handlers.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Mutex<LruCache<CacheKey, CacheEntry>>>,
    ttl: Duration,
}

impl QueryCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::Config("cache capacity must be at least 1".to_string()))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn get(&self, key: &CacheKey) -> Option<ResultSet> {
        self.get_at(key, Instant::now())
    }

    /// Lookup against an explicit clock reading
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<ResultSet> {
        let mut cache = self.lock();

        let inserted_at = cache.peek(key)?.inserted_at;
        if now.saturating_duration_since(inserted_at) > self.ttl {
            cache.pop(key);
            debug!(session = %key.session, query = %key.query, "Query cache entry expired");
            return None;
        }

        cache.peek(key).map(|entry| entry.results.clone())
    }

    pub fn put(&self, key: CacheKey, results: ResultSet) {
        self.put_at(key, results, Instant::now())
    }

    /// Insert against an explicit clock reading
    pub fn put_at(&self, key: CacheKey, results: ResultSet, now: Instant) {
        let mut cache = self.lock();

        // Drop first so a re-insert always lands in the most recent slot
        cache.pop(&key);

        let entry = CacheEntry {
            inserted_at: now,
            results,
        };
        if let Some((evicted, _)) = cache.push(key, entry) {
            debug!(
                session = %evicted.session,
                query = %evicted.query,
                "Query cache full, evicted oldest entry"
            );
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let mut cache = self.lock();

        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.inserted_at) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            cache.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        self.inner.lock().expect("query cache lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultItem;

    fn results(n: usize, tag: &str) -> ResultSet {
        (0..n)
            .map(|i| ResultItem::new(format!("{tag}{i}"), format!("{tag} song {i}"), format!("https://x/{tag}{i}")))
            .collect::<Vec<_>>()
            .into()
    }

    fn key(session: i64, query: &str) -> CacheKey {
        CacheKey::new(SessionId(session), query)
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Coldplay   Viva La Vida "), "coldplay viva la vida");
        assert_eq!(normalize_query("\tA\nB"), "a b");
        assert_eq!(normalize_query("   "), "");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(QueryCache::new(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_get_returns_cached_results() {
        let cache = QueryCache::new(10, Duration::from_secs(300)).unwrap();
        let set = results(3, "a");
        cache.put(key(1, "coldplay"), set.clone());

        let hit = cache.get(&key(1, "  Coldplay ")).expect("normalized key should hit");
        assert!(hit.ptr_eq(&set));
    }

    #[test]
    fn test_sessions_do_not_share_entries() {
        let cache = QueryCache::new(10, Duration::from_secs(300)).unwrap();
        cache.put(key(1, "coldplay"), results(3, "a"));

        assert!(cache.get(&key(2, "coldplay")).is_none());
        assert!(cache.get(&key(1, "coldplay")).is_some());
    }

    #[test]
    fn test_expired_entry_is_removed_on_get() {
        let cache = QueryCache::new(10, Duration::from_secs(300)).unwrap();
        let t0 = Instant::now();
        cache.put_at(key(1, "q"), results(2, "a"), t0);

        // Exactly TTL old is still valid
        assert!(cache.get_at(&key(1, "q"), t0 + Duration::from_secs(300)).is_some());

        assert!(cache.get_at(&key(1, "q"), t0 + Duration::from_secs(301)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest_insertion() {
        let cache = QueryCache::new(3, Duration::from_secs(300)).unwrap();
        cache.put(key(1, "a"), results(1, "a"));
        cache.put(key(1, "b"), results(1, "b"));
        cache.put(key(1, "c"), results(1, "c"));

        // A lookup does not protect "a" from eviction
        assert!(cache.get(&key(1, "a")).is_some());

        cache.put(key(1, "d"), results(1, "d"));
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(1, "a")).is_none());
        assert!(cache.get(&key(1, "b")).is_some());
        assert!(cache.get(&key(1, "d")).is_some());
    }

    #[test]
    fn test_reinsert_replaces_and_refreshes() {
        let cache = QueryCache::new(2, Duration::from_secs(300)).unwrap();
        let first = results(1, "first");
        let second = results(2, "second");

        cache.put(key(1, "a"), first);
        cache.put(key(1, "b"), results(1, "b"));
        cache.put(key(1, "a"), second.clone());
        assert_eq!(cache.len(), 2);

        // "b" is now the oldest insertion
        cache.put(key(1, "c"), results(1, "c"));
        assert!(cache.get(&key(1, "b")).is_none());

        let hit = cache.get(&key(1, "a")).unwrap();
        assert!(hit.ptr_eq(&second));
    }

    #[test]
    fn test_reinsert_restarts_ttl() {
        let cache = QueryCache::new(4, Duration::from_secs(10)).unwrap();
        let t0 = Instant::now();
        cache.put_at(key(1, "a"), results(1, "a"), t0);
        cache.put_at(key(1, "a"), results(1, "a"), t0 + Duration::from_secs(8));

        assert!(cache.get_at(&key(1, "a"), t0 + Duration::from_secs(15)).is_some());
    }

    #[test]
    fn test_purge_expired() {
        let cache = QueryCache::new(10, Duration::from_secs(10)).unwrap();
        let t0 = Instant::now();
        cache.put_at(key(1, "old"), results(1, "o"), t0);
        cache.put_at(key(1, "new"), results(1, "n"), t0 + Duration::from_secs(9));

        let purged = cache.purge_expired_at(t0 + Duration::from_secs(11));
        assert_eq!(purged, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get_at(&key(1, "new"), t0 + Duration::from_secs(11)).is_some());
    }
}
