//! Validated cache module.
//!
//! This module provides the bounded store that sits in front of the
//! providers:
//! - Schema validation and free-text sanitization at the insertion boundary
//! - Per-entry TTL with lazy expiry on read
//! - Least-recently-used eviction at capacity, delegated to `moka`
//! - A background sweeper for proactive expiry

mod sanitize;
mod schema;
mod store;
mod sweeper;

use std::time::Duration;

use serde::Serialize;

use crate::models::{Quote, SearchResult};

pub(crate) use sanitize::sanitize_search_results;
pub use sanitize::sanitize_text;
pub use schema::{
    validate_key, validate_payload, MAX_BATCH_QUOTES, MAX_DEPTH, MAX_KEY_LEN, MAX_OBJECT_KEYS,
    MAX_SEARCH_RESULTS, MAX_TEXT_LEN,
};
pub use store::{CacheStats, ValidatedCache};
pub use sweeper::{spawn_sweeper, SweeperHandle};

/// Default number of entries.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cache sizing and sweep settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub capacity: usize,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// What can be stored in the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    Quote(Quote),
    Search(Vec<SearchResult>),
    Batch(Vec<Quote>),
}

/// Cache key for a search query. The query is expected to be trimmed.
pub fn search_key(query: &str) -> String {
    format!("search:{}", query.to_lowercase())
}

/// Cache key for an ordered batch of symbols.
pub fn batch_key<S: AsRef<str>>(symbols: &[S]) -> String {
    let joined: Vec<&str> = symbols.iter().map(AsRef::as_ref).collect();
    format!("batch:{}", joined.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(search_key("Apple"), "search:apple");
        assert_eq!(batch_key(&["AAPL", "MSFT"]), "batch:AAPL,MSFT");
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }
}
