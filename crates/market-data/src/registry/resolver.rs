//! Fallback resolver for quotes and symbol search.
//!
//! The resolver owns the statically ordered provider list and handles:
//! - Cache lookups before any network call
//! - Availability and quota gating per provider
//! - Fallback to the next provider on any provider-level failure
//! - Aggregation of every failure into one error
//! - Concurrent batch resolution

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;

use super::{HealthTracker, QuotaTracker};
use crate::cache::{
    batch_key, sanitize_search_results, sanitize_text, search_key, CachePayload, ValidatedCache,
};
use crate::errors::{FailureKind, MarketDataError, ProviderFailures};
use crate::models::{BatchQuotes, Quote, ResolvedQuote, SearchOutcome, SearchResult, Symbol};
use crate::provider::{MarketDataProvider, MAX_SEARCH_RESULTS};

/// Default TTL for quote entries.
pub const DEFAULT_QUOTE_TTL: Duration = Duration::from_secs(60);

/// Default TTL for search entries.
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(300);

/// Default maximum symbols per batch request.
pub const DEFAULT_BATCH_LIMIT: usize = 20;

/// Longest accepted search query, in characters.
pub const MAX_QUERY_LEN: usize = 50;

/// Resolver tuning.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub quote_ttl: Duration,
    pub search_ttl: Duration,
    pub batch_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            quote_ttl: DEFAULT_QUOTE_TTL,
            search_ttl: DEFAULT_SEARCH_TTL,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

/// Outcome of probing one provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Failed,
    /// Not called: unusable key or no quota left.
    Skipped,
}

/// Result of a live connectivity check against one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub provider: String,
    pub name: String,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fallback resolver over a fixed, priority-ordered provider list.
pub struct QuoteResolver {
    providers: Vec<Arc<dyn MarketDataProvider>>,
    cache: Arc<ValidatedCache>,
    quota: Arc<QuotaTracker>,
    health: Arc<HealthTracker>,
    config: ResolverConfig,
}

impl QuoteResolver {
    /// Create a resolver. Providers are sorted by priority once, here; the
    /// order never changes afterwards. The cache and both trackers are shared
    /// handles built by the caller; quotas are expected to be registered
    /// already (see [`QuotaTracker::for_providers`]).
    pub fn new(
        providers: Vec<Arc<dyn MarketDataProvider>>,
        cache: Arc<ValidatedCache>,
        quota: Arc<QuotaTracker>,
        health: Arc<HealthTracker>,
        config: ResolverConfig,
    ) -> Self {
        let mut providers = providers;
        providers.sort_by_key(|p| p.priority());

        info!(
            "Quote resolver initialized with providers: {}",
            providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(", ")
        );

        Self {
            providers,
            cache,
            quota,
            health,
            config,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn MarketDataProvider>] {
        &self.providers
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn cache(&self) -> &Arc<ValidatedCache> {
        &self.cache
    }

    pub fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a raw, user-supplied symbol.
    pub async fn resolve(&self, raw_symbol: &str) -> Result<ResolvedQuote, MarketDataError> {
        let symbol = Symbol::parse(raw_symbol)?;
        self.resolve_symbol(&symbol).await
    }

    /// Resolve a validated symbol.
    ///
    /// 1. Return the cached `quote:{SYMBOL}` entry if live
    /// 2. Otherwise try providers in priority order, skipping unusable ones
    ///    and ones with no quota left
    /// 3. Cache and return the first valid quote
    /// 4. If nothing answered, return `AllProvidersFailed` with every reason
    pub async fn resolve_symbol(&self, symbol: &Symbol) -> Result<ResolvedQuote, MarketDataError> {
        self.resolve_with_lifetime(symbol).await.map(|(resolved, _)| resolved)
    }

    /// Resolve a symbol and report how long the answer stays fresh: the
    /// cache entry's remaining lifetime on a hit, the full quote TTL on a
    /// fetch.
    async fn resolve_with_lifetime(
        &self,
        symbol: &Symbol,
    ) -> Result<(ResolvedQuote, Duration), MarketDataError> {
        let key = symbol.quote_key();

        if let Some((CachePayload::Quote(quote), remaining)) = self.cache.get_with_remaining(&key) {
            debug!("Cache hit for {}", key);
            let resolved = ResolvedQuote {
                quote,
                cached: true,
                failures: ProviderFailures::new(),
            };
            return Ok((resolved, remaining));
        }

        let (quote, failures) = self.fetch_from_providers(symbol).await?;
        let quote = quote.with_fetched_at(Utc::now());

        // A rejected payload is served uncached
        if let Err(e) = self
            .cache
            .try_set(&key, CachePayload::Quote(quote.clone()), self.config.quote_ttl)
        {
            warn!("Not caching quote for {}: {}", symbol, e);
        }

        let resolved = ResolvedQuote {
            quote,
            cached: false,
            failures,
        };
        Ok((resolved, self.config.quote_ttl))
    }

    async fn fetch_from_providers(
        &self,
        symbol: &Symbol,
    ) -> Result<(Quote, ProviderFailures), MarketDataError> {
        let mut failures = ProviderFailures::new();

        for provider in &self.providers {
            let provider_id = provider.id();

            if !self.admit(provider.as_ref(), &mut failures) {
                continue;
            }

            let started = Instant::now();
            let timeout = provider.descriptor().effective_timeout();
            let outcome = match tokio::time::timeout(timeout, provider.fetch_quote(symbol)).await {
                Ok(result) => result.and_then(|quote| accept_quote(provider_id, symbol, quote)),
                Err(_) => Err(MarketDataError::Timeout {
                    provider: provider_id.to_string(),
                }),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(quote) => {
                    self.health.record_success(provider_id, elapsed);
                    info!(
                        "Resolved {} from '{}' in {}ms ({} earlier failures)",
                        symbol,
                        provider_id,
                        elapsed.as_millis(),
                        failures.len()
                    );
                    return Ok((quote, failures));
                }
                Err(e) => {
                    self.health.record_failure(provider_id, &e.to_string(), elapsed);
                    debug!(
                        "Provider '{}' failed for {} ({:?}): {}, trying next",
                        provider_id,
                        symbol,
                        e.retry_class(),
                        e
                    );
                    failures.insert(provider_id, e.failure_kind(), e.to_string());
                }
            }
        }

        warn!("All providers failed for {}: {}", symbol, failures.summary());
        Err(MarketDataError::AllProvidersFailed { failures })
    }

    /// Availability and quota gate. Records the skip reason and returns false
    /// if the provider must not be called.
    fn admit(&self, provider: &dyn MarketDataProvider, failures: &mut ProviderFailures) -> bool {
        let provider_id = provider.id();

        if let Err(e) = provider.check_available() {
            debug!("Provider '{}' unavailable: {}", provider_id, e);
            failures.insert(provider_id, e.failure_kind(), e.to_string());
            return false;
        }

        if !self.quota.try_acquire(provider_id) {
            let message = match self.quota.status(provider_id) {
                Some(status) => format!("Quota exhausted until {}", status.reset_at.to_rfc3339()),
                None => "Quota exhausted".to_string(),
            };
            debug!("Provider '{}' skipped: {}", provider_id, message);
            failures.insert(provider_id, FailureKind::QuotaExhausted, message);
            return false;
        }

        true
    }

    /// Resolve many raw symbols concurrently.
    ///
    /// Each valid symbol is resolved exactly as [`QuoteResolver::resolve`]
    /// would, sharing its `quote:{SYMBOL}` cache entry. Invalid or failing
    /// symbols land in `errors`; the batch itself only fails when the input
    /// list is empty or longer than the batch limit. A fully successful batch
    /// is cached until its stalest quote would expire.
    pub async fn resolve_batch<S: AsRef<str>>(
        &self,
        raw_symbols: &[S],
    ) -> Result<BatchQuotes, MarketDataError> {
        if raw_symbols.is_empty() {
            return Err(MarketDataError::InvalidQuery(
                "symbols must not be empty".to_string(),
            ));
        }
        if raw_symbols.len() > self.config.batch_limit {
            return Err(MarketDataError::InvalidQuery(format!(
                "at most {} symbols per batch",
                self.config.batch_limit
            )));
        }

        let mut errors = BTreeMap::new();
        let mut symbols: Vec<Symbol> = Vec::with_capacity(raw_symbols.len());
        for raw in raw_symbols {
            match Symbol::parse(raw.as_ref()) {
                Ok(symbol) if !symbols.contains(&symbol) => symbols.push(symbol),
                Ok(_) => {}
                Err(_) => {
                    let shown: String = raw.as_ref().trim().chars().take(32).collect();
                    errors.insert(shown, "Invalid symbol format".to_string());
                }
            }
        }

        let key = batch_key(&symbols);
        if errors.is_empty() && !symbols.is_empty() {
            if let Some(CachePayload::Batch(quotes)) = self.cache.get(&key) {
                debug!("Cache hit for {}", key);
                return Ok(BatchQuotes {
                    quotes,
                    errors,
                    cached: true,
                });
            }
        }

        let results = join_all(symbols.iter().map(|s| self.resolve_with_lifetime(s))).await;

        let mut quotes = Vec::with_capacity(symbols.len());
        let mut lifetime = self.config.quote_ttl;
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok((resolved, remaining)) => {
                    lifetime = lifetime.min(remaining);
                    quotes.push(resolved.quote);
                }
                Err(e) => {
                    errors.insert(symbol.to_string(), batch_error_message(&e));
                }
            }
        }

        if errors.is_empty() && !quotes.is_empty() && !lifetime.is_zero() {
            if let Err(e) = self
                .cache
                .try_set(&key, CachePayload::Batch(quotes.clone()), lifetime)
            {
                warn!("Not caching batch {}: {}", key, e);
            }
        }

        info!(
            "Batch resolved {} quotes, {} errors",
            quotes.len(),
            errors.len()
        );
        Ok(BatchQuotes {
            quotes,
            errors,
            cached: false,
        })
    }

    /// Search symbols across providers that support it, with the same
    /// gating, fallback and aggregation as quote resolution.
    pub async fn search(&self, raw_query: &str) -> Result<SearchOutcome, MarketDataError> {
        let query = normalize_query(raw_query)?;
        let key = search_key(&query);

        if let Some(CachePayload::Search(results)) = self.cache.get(&key) {
            debug!("Cache hit for {}", key);
            return Ok(SearchOutcome {
                results,
                cached: true,
            });
        }

        let mut failures = ProviderFailures::new();

        for provider in self.providers.iter().filter(|p| p.supports_search()) {
            let provider_id = provider.id();

            if !self.admit(provider.as_ref(), &mut failures) {
                continue;
            }

            let started = Instant::now();
            let timeout = provider.descriptor().effective_timeout();
            let outcome = match tokio::time::timeout(timeout, provider.search(&query)).await {
                Ok(result) => result,
                Err(_) => Err(MarketDataError::Timeout {
                    provider: provider_id.to_string(),
                }),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(mut results) => {
                    self.health.record_success(provider_id, elapsed);
                    results.truncate(MAX_SEARCH_RESULTS);
                    let results = self.cache_search(&key, results);
                    info!(
                        "Search '{}' answered by '{}' with {} results",
                        query,
                        provider_id,
                        results.len()
                    );
                    return Ok(SearchOutcome {
                        results,
                        cached: false,
                    });
                }
                Err(e) => {
                    self.health.record_failure(provider_id, &e.to_string(), elapsed);
                    debug!("Search via '{}' failed: {}, trying next", provider_id, e);
                    failures.insert(provider_id, e.failure_kind(), e.to_string());
                }
            }
        }

        warn!("All providers failed for search '{}': {}", query, failures.summary());
        Err(MarketDataError::AllProvidersFailed { failures })
    }

    /// Sanitize and cache search results. A rejected set still returns the
    /// sanitized results, uncached.
    fn cache_search(&self, key: &str, mut results: Vec<SearchResult>) -> Vec<SearchResult> {
        sanitize_search_results(&mut results);
        let payload = CachePayload::Search(results.clone());
        if let Err(e) = self.cache.try_set(key, payload, self.config.search_ttl) {
            warn!("Not caching search {}: {}", key, e);
        }
        results
    }

    /// Probe every provider once with `canary`, concurrently.
    ///
    /// Bypasses the cache. Respects availability and quota gating: a gated
    /// provider is reported as skipped and not called. Calls that are made
    /// count against quota and feed health tracking.
    pub async fn probe_all(&self, canary: &Symbol) -> Vec<ProbeResult> {
        join_all(self.providers.iter().map(|p| self.probe(p.as_ref(), canary))).await
    }

    async fn probe(&self, provider: &dyn MarketDataProvider, canary: &Symbol) -> ProbeResult {
        let provider_id = provider.id();
        let mut result = ProbeResult {
            provider: provider_id.to_string(),
            name: provider.descriptor().name.to_string(),
            status: ProbeStatus::Skipped,
            latency_ms: None,
            price: None,
            error: None,
        };

        let mut skipped = ProviderFailures::new();
        if !self.admit(provider, &mut skipped) {
            result.error = skipped.get(provider_id).map(|f| f.message.clone());
            return result;
        }

        let started = Instant::now();
        let timeout = provider.descriptor().effective_timeout();
        let outcome = match tokio::time::timeout(timeout, provider.fetch_quote(canary)).await {
            Ok(r) => r.and_then(|quote| accept_quote(provider_id, canary, quote)),
            Err(_) => Err(MarketDataError::Timeout {
                provider: provider_id.to_string(),
            }),
        };
        let elapsed = started.elapsed();
        result.latency_ms = Some(elapsed.as_millis() as u64);

        match outcome {
            Ok(quote) => {
                self.health.record_success(provider_id, elapsed);
                result.status = ProbeStatus::Ok;
                result.price = Some(quote.price);
            }
            Err(e) => {
                self.health.record_failure(provider_id, &e.to_string(), elapsed);
                result.status = ProbeStatus::Failed;
                result.error = Some(e.to_string());
            }
        }
        result
    }
}

/// Tag a provider's quote with its source and re-check it. Adapters are not
/// trusted to have produced a valid quote for the requested symbol.
fn accept_quote(provider_id: &str, symbol: &Symbol, quote: Quote) -> Result<Quote, MarketDataError> {
    let quote = quote.with_provider(provider_id);
    if quote.symbol != symbol.as_str() {
        return Err(MarketDataError::InvalidResponse {
            provider: provider_id.to_string(),
            message: format!("asked for {} but got {}", symbol, quote.symbol),
        });
    }
    quote
        .check_invariants()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: provider_id.to_string(),
            message,
        })?;
    Ok(quote)
}

/// Trim and bound a search query.
pub fn normalize_query(raw: &str) -> Result<String, MarketDataError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MarketDataError::InvalidQuery("query must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_QUERY_LEN {
        return Err(MarketDataError::InvalidQuery(format!(
            "query longer than {} characters",
            MAX_QUERY_LEN
        )));
    }
    let sanitized = sanitize_text(trimmed, MAX_QUERY_LEN);
    if sanitized.is_empty() {
        return Err(MarketDataError::InvalidQuery(
            "query has no searchable text".to_string(),
        ));
    }
    Ok(sanitized)
}

/// Per-symbol message for batch responses.
fn batch_error_message(error: &MarketDataError) -> String {
    match error {
        MarketDataError::AllProvidersFailed { failures } if failures.is_not_found() => {
            "Symbol not found".to_string()
        }
        MarketDataError::AllProvidersFailed { .. } => "Market data unavailable".to_string(),
        other => other.to_string(),
    }
}
