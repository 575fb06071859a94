//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{Quote, SearchResult, Symbol};

use super::descriptor::ProviderDescriptor;

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source. The
/// resolver orders providers by [`ProviderDescriptor::priority`] once at
/// construction and gates every call through the quota tracker.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use alfalyzer_market_data::provider::{MarketDataProvider, ProviderDescriptor};
///
/// struct MyProvider {
///     descriptor: ProviderDescriptor,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn descriptor(&self) -> &ProviderDescriptor {
///         &self.descriptor
///     }
///
///     async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
///         // ... one outbound call, mapped to a canonical Quote
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Static configuration for this provider.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Unique identifier for this provider.
    ///
    /// A constant string like "FINNHUB", "ALPHA_VANTAGE", etc. Used for
    /// logging, quota tracking and failure maps.
    fn id(&self) -> &'static str {
        self.descriptor().id
    }

    /// Lower values are tried first.
    fn priority(&self) -> u8 {
        self.descriptor().priority
    }

    fn supports_search(&self) -> bool {
        self.descriptor().supports_search
    }

    /// Whether the provider can be called at all (key present and not a
    /// placeholder). Checked by the resolver before the quota gate so an
    /// unusable provider never consumes quota.
    ///
    /// Default implementation always succeeds.
    fn check_available(&self) -> Result<(), MarketDataError> {
        Ok(())
    }

    /// Fetch the current quote for a symbol.
    ///
    /// Performs at most one outbound call, bounded by the descriptor's
    /// timeout. The returned quote carries this provider's id.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError>;

    /// Search for symbols matching the query.
    ///
    /// Default implementation returns `NotSupported`.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        let _ = query;
        Err(MarketDataError::NotSupported {
            operation: "search".to_string(),
            provider: self.id().to_string(),
        })
    }
}
