//! Best-effort cache pre-population.

use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info};
use tokio::task::JoinHandle;

use crate::models::Symbol;
use crate::registry::QuoteResolver;

/// Symbols warmed when the caller does not name any.
pub const DEFAULT_WARM_SYMBOLS: [&str; 8] =
    ["AAPL", "GOOGL", "MSFT", "TSLA", "AMZN", "NVDA", "META", "SPY"];

/// Most symbols accepted by a single warm request.
pub const MAX_WARM_SYMBOLS: usize = 50;

/// Resolves symbols for their side effect on the cache.
#[derive(Clone)]
pub struct CacheWarmer {
    resolver: Arc<QuoteResolver>,
}

impl CacheWarmer {
    pub fn new(resolver: Arc<QuoteResolver>) -> Self {
        Self { resolver }
    }

    /// Parse and dedupe the requested symbols, falling back to
    /// [`DEFAULT_WARM_SYMBOLS`] when none are given. Invalid entries are
    /// dropped.
    pub fn accept<S: AsRef<str>>(requested: Option<&[S]>) -> Vec<Symbol> {
        let mut accepted: Vec<Symbol> = Vec::new();
        let mut push = |raw: &str| {
            if let Ok(symbol) = Symbol::parse(raw) {
                if !accepted.contains(&symbol) && accepted.len() < MAX_WARM_SYMBOLS {
                    accepted.push(symbol);
                }
            }
        };
        match requested {
            Some(symbols) if !symbols.is_empty() => {
                symbols.iter().for_each(|s| push(s.as_ref()));
            }
            _ => DEFAULT_WARM_SYMBOLS.iter().for_each(|s| push(s)),
        }
        accepted
    }

    /// Resolve every symbol concurrently. Failures are logged and
    /// discarded. Returns how many symbols resolved.
    pub async fn warm(&self, symbols: &[Symbol]) -> usize {
        let results = join_all(symbols.iter().map(|s| self.resolver.resolve_symbol(s))).await;

        let mut warmed = 0;
        for (symbol, result) in symbols.iter().zip(results) {
            match result {
                Ok(_) => warmed += 1,
                Err(e) => debug!("Warming {} failed: {}", symbol, e),
            }
        }
        info!("Cache warm finished: {}/{} symbols", warmed, symbols.len());
        warmed
    }

    /// Start warming in the background and return the accepted symbols
    /// immediately.
    pub fn spawn_warm<S: AsRef<str>>(&self, requested: Option<&[S]>) -> (Vec<Symbol>, JoinHandle<usize>) {
        let symbols = Self::accept(requested);
        let warmer = self.clone();
        let batch = symbols.clone();
        let handle = tokio::spawn(async move { warmer.warm(&batch).await });
        (symbols, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ValidatedCache;
    use crate::errors::MarketDataError;
    use crate::models::Quote;
    use crate::provider::{MarketDataProvider, ProviderDescriptor};
    use crate::registry::{HealthTracker, QuotaTracker, ResolverConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        descriptor: ProviderDescriptor,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for FlakyProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol.as_str() == "TSLA" {
                return Err(MarketDataError::SymbolNotFound {
                    provider: "FLAKY".to_string(),
                    symbol: symbol.to_string(),
                });
            }
            Quote::builder(symbol.as_str(), 100.0)
                .build()
                .map_err(|message| MarketDataError::InvalidResponse {
                    provider: "FLAKY".to_string(),
                    message,
                })
        }
    }

    fn warmer() -> (CacheWarmer, Arc<FlakyProvider>) {
        let provider = Arc::new(FlakyProvider {
            descriptor: ProviderDescriptor::new("FLAKY", "Flaky", "http://localhost"),
            calls: AtomicUsize::new(0),
        });
        let providers = vec![provider.clone() as Arc<dyn MarketDataProvider>];
        let resolver = QuoteResolver::new(
            providers.clone(),
            Arc::new(ValidatedCache::with_capacity(100)),
            Arc::new(QuotaTracker::for_providers(&providers)),
            Arc::new(HealthTracker::new()),
            ResolverConfig::default(),
        );
        (CacheWarmer::new(Arc::new(resolver)), provider)
    }

    #[test]
    fn test_accept_defaults_and_filters() {
        let none: Option<&[&str]> = None;
        assert_eq!(CacheWarmer::accept(none).len(), DEFAULT_WARM_SYMBOLS.len());

        let empty: [&str; 0] = [];
        assert_eq!(CacheWarmer::accept(Some(&empty[..])).len(), 8);

        let requested = ["aapl", "AAPL", "BAD!", "msft"];
        let accepted = CacheWarmer::accept(Some(&requested[..]));
        let names: Vec<&str> = accepted.iter().map(Symbol::as_str).collect();
        assert_eq!(names, vec!["AAPL", "MSFT"]);
    }

    #[tokio::test]
    async fn test_warm_discards_failures_and_fills_cache() {
        let (warmer, provider) = warmer();
        let symbols = CacheWarmer::accept(Some(&["AAPL", "TSLA", "MSFT"][..]));

        let warmed = warmer.warm(&symbols).await;
        assert_eq!(warmed, 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(warmer.resolver.cache().get("quote:AAPL").is_some());
        assert!(warmer.resolver.cache().get("quote:TSLA").is_none());
    }

    #[tokio::test]
    async fn test_spawn_warm_returns_accepted_symbols() {
        let (warmer, _provider) = warmer();
        let none: Option<&[String]> = None;
        let (accepted, handle) = warmer.spawn_warm(none);
        assert_eq!(accepted.len(), 8);
        assert_eq!(handle.await.unwrap(), 7);
        assert_eq!(warmer.resolver.cache().len(), 7);
    }
}
