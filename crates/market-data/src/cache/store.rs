//! Bounded, TTL-aware, validating LRU store backed by `moka`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use serde::Serialize;
use tokio::time::Instant;

use crate::errors::MarketDataError;

use super::sanitize::sanitize_payload;
use super::schema::{validate_key, validate_payload};
use super::{CacheConfig, CachePayload};

#[derive(Clone, Debug)]
struct Entry {
    payload: CachePayload,
    ttl: Duration,
    /// Deadline on the runtime clock, checked on every read.
    expires_at: Instant,
}

/// Lets moka drop each entry after its own TTL.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rejections: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Cache occupancy and counters for diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 when there have been no lookups.
    pub hit_rate: f64,
    pub insertions: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub rejections: u64,
}

/// Key/value store that only accepts schema-valid, sanitized payloads.
///
/// - Every entry carries its own expiry; expired entries are dropped on read
///   and by [`ValidatedCache::purge_expired`].
/// - A hit moves the entry to the most-recent end. Inserting past capacity
///   evicts the least recently used entry.
/// - Pending moka maintenance runs after every write, so capacity holds once
///   `try_set` returns.
pub struct ValidatedCache {
    capacity: usize,
    store: Cache<String, Entry>,
    counters: Arc<Counters>,
}

impl fmt::Debug for ValidatedCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedCache")
            .field("capacity", &self.capacity)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl ValidatedCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let counters = Arc::new(Counters::default());

        let listener_counters = Arc::clone(&counters);
        let store = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryTtl)
            .eviction_listener(move |key: Arc<String>, _entry: Entry, cause: RemovalCause| {
                match cause {
                    RemovalCause::Size => {
                        Counters::bump(&listener_counters.evictions);
                        debug!("Cache evicted '{}'", key);
                    }
                    RemovalCause::Expired => Counters::bump(&listener_counters.expirations),
                    _ => {}
                }
            })
            .build();

        Self {
            capacity,
            store,
            counters,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a live entry, bumping its recency.
    pub fn get(&self, key: &str) -> Option<CachePayload> {
        self.get_with_remaining(key).map(|(payload, _)| payload)
    }

    /// Like [`ValidatedCache::get`], also returning how long the entry has
    /// left to live.
    pub fn get_with_remaining(&self, key: &str) -> Option<(CachePayload, Duration)> {
        let now = Instant::now();
        match self.store.get(key) {
            None => {
                Counters::bump(&self.counters.misses);
                None
            }
            Some(entry) if entry.expires_at <= now => {
                self.store.invalidate(key);
                Counters::bump(&self.counters.expirations);
                Counters::bump(&self.counters.misses);
                debug!("Cache entry '{}' expired", key);
                None
            }
            Some(entry) => {
                Counters::bump(&self.counters.hits);
                let remaining = entry.expires_at.saturating_duration_since(now);
                Some((entry.payload, remaining))
            }
        }
    }

    /// Sanitize, validate and store a payload.
    ///
    /// On rejection nothing is stored and any previous entry under the key is
    /// removed, so a later `get` is a miss.
    pub fn try_set(&self, key: &str, payload: CachePayload, ttl: Duration) -> Result<(), MarketDataError> {
        let mut payload = payload;
        sanitize_payload(&mut payload);

        if let Err(message) = validate_key(key).and_then(|_| validate_payload(&payload)) {
            self.store.invalidate(key);
            Counters::bump(&self.counters.rejections);
            debug!("Cache rejected '{}': {}", key, message);
            return Err(MarketDataError::CacheValidationFailed { message });
        }

        let entry = Entry {
            payload,
            ttl,
            expires_at: Instant::now() + ttl,
        };
        self.store.insert(key.to_string(), entry);
        Counters::bump(&self.counters.insertions);
        self.store.run_pending_tasks();
        Ok(())
    }

    /// Store a payload; returns false if it was rejected.
    pub fn set(&self, key: &str, payload: CachePayload, ttl: Duration) -> bool {
        self.try_set(key, payload, ttl).is_ok()
    }

    /// Drop one entry. Returns true if it existed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        self.store.run_pending_tasks();
        removed
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let keys: Vec<Arc<String>> = self.store.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.store.invalidate(key.as_str());
        }
        self.store.run_pending_tasks();
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = Counters::read(&self.counters.expirations);

        let expired: Vec<Arc<String>> = self
            .store
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key)
            .collect();
        for key in &expired {
            self.store.invalidate(key.as_str());
        }
        self.counters
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);

        // Also drops whatever moka itself found expired
        self.store.run_pending_tasks();
        Counters::read(&self.counters.expirations).saturating_sub(before) as usize
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.store.run_pending_tasks();
        self.store.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        let hits = Counters::read(&c.hits);
        let misses = Counters::read(&c.misses);
        let lookups = hits + misses;
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            insertions: Counters::read(&c.insertions),
            evictions: Counters::read(&c.evictions),
            expirations: Counters::read(&c.expirations),
            rejections: Counters::read(&c.rejections),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Quote, SearchResult};

    const TTL: Duration = Duration::from_secs(60);

    fn quote(symbol: &str, price: f64) -> CachePayload {
        CachePayload::Quote(
            Quote::builder(symbol, price)
                .previous_close(Some(100.0))
                .timestamp(Some(1_704_067_200))
                .provider("FINNHUB")
                .build()
                .unwrap(),
        )
    }

    fn invalid_quote(symbol: &str, price: f64) -> CachePayload {
        let mut q = match quote("AAPL", 1.0) {
            CachePayload::Quote(q) => q,
            _ => unreachable!(),
        };
        q.symbol = symbol.to_string();
        q.price = price;
        CachePayload::Quote(q)
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get() {
        let cache = ValidatedCache::with_capacity(10);
        assert!(cache.set("quote:AAPL", quote("AAPL", 150.0), TTL));
        assert_eq!(cache.get("quote:AAPL"), Some(quote("AAPL", 150.0)));
        assert_eq!(cache.get("quote:MSFT"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.insertions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = ValidatedCache::with_capacity(10);
        cache.set("quote:AAPL", quote("AAPL", 150.0), TTL);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("quote:AAPL").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("quote:AAPL").is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_independently() {
        let cache = ValidatedCache::with_capacity(10);
        cache.set("quote:AAPL", quote("AAPL", 150.0), Duration::from_secs(60));
        cache.set("search:apple", CachePayload::Search(vec![]), Duration::from_secs(300));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("quote:AAPL").is_none());
        assert!(cache.get("search:apple").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_invalid_payloads() {
        let cache = ValidatedCache::with_capacity(10);
        assert!(!cache.set("quote:AAPL", invalid_quote("AAPL", 0.0), TTL));
        assert!(!cache.set("quote:AAPL", invalid_quote("AAPL", f64::NAN), TTL));
        assert!(!cache.set("quote:BAD", invalid_quote("BAD!", 10.0), TTL));
        assert!(cache.get("quote:AAPL").is_none());
        assert!(cache.get("quote:BAD").is_none());
        assert_eq!(cache.stats().rejections, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_removes_previous_entry() {
        let cache = ValidatedCache::with_capacity(10);
        assert!(cache.set("quote:AAPL", quote("AAPL", 150.0), TTL));

        let err = cache
            .try_set("quote:AAPL", invalid_quote("AAPL", -1.0), TTL)
            .unwrap_err();
        assert!(matches!(err, MarketDataError::CacheValidationFailed { .. }));
        assert!(cache.get("quote:AAPL").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lru_evicts_least_recently_accessed() {
        let cache = ValidatedCache::with_capacity(3);
        cache.set("quote:A", quote("A", 1.0), TTL);
        cache.set("quote:B", quote("B", 1.0), TTL);
        cache.set("quote:C", quote("C", 1.0), TTL);

        // A is the oldest insert but the most recently read
        assert!(cache.get("quote:A").is_some());

        cache.set("quote:D", quote("D", 1.0), TTL);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("quote:B").is_none());
        assert!(cache.get("quote:A").is_some());
        assert!(cache.get("quote:C").is_some());
        assert!(cache.get("quote:D").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_recency() {
        let cache = ValidatedCache::with_capacity(2);
        cache.set("quote:A", quote("A", 1.0), TTL);
        cache.set("quote:B", quote("B", 1.0), TTL);
        cache.set("quote:A", quote("A", 2.0), TTL);
        cache.set("quote:C", quote("C", 1.0), TTL);

        assert!(cache.get("quote:B").is_none());
        assert_eq!(cache.get("quote:A"), Some(quote("A", 2.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ValidatedCache::with_capacity(10);
        cache.set("quote:A", quote("A", 1.0), Duration::from_secs(10));
        cache.set("quote:B", quote("B", 1.0), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_payload_is_sanitized() {
        let cache = ValidatedCache::with_capacity(10);
        let results = vec![SearchResult::new("AAPL", "Apple<script>x</script> Inc", "Stock", "US")];
        assert!(cache.set("search:apple", CachePayload::Search(results), TTL));

        match cache.get("search:apple") {
            Some(CachePayload::Search(results)) => assert_eq!(results[0].name, "Apple Inc"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_lifetime() {
        let cache = ValidatedCache::with_capacity(10);
        cache.set("quote:AAPL", quote("AAPL", 150.0), TTL);

        tokio::time::advance(Duration::from_secs(45)).await;
        let (_, remaining) = cache.get_with_remaining("quote:AAPL").unwrap();
        assert_eq!(remaining, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_holds_under_many_inserts() {
        let cache = ValidatedCache::with_capacity(5);
        for i in 0..20 {
            cache.set(&format!("quote:S{}", i), quote(&format!("S{}", i), 1.0), TTL);
        }
        let stats = cache.stats();
        assert_eq!(stats.size, 5);
        assert_eq!(stats.evictions, 15);
        assert!(cache.get("quote:S19").is_some());
        assert!(cache.get("quote:S0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_clear() {
        let cache = ValidatedCache::with_capacity(10);
        cache.set("quote:A", quote("A", 1.0), TTL);
        cache.set("quote:B", quote("B", 1.0), TTL);

        assert!(cache.remove("quote:A"));
        assert!(!cache.remove("quote:A"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().insertions, 2);
    }
}
