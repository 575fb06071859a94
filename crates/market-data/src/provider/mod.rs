//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - `ProviderDescriptor`, the static per-provider configuration
//! - Concrete provider implementations (Finnhub, Alpha Vantage, etc.)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: the resolver only sees `dyn MarketDataProvider`
//! - **Extensible**: new providers are added by implementing `MarketDataProvider`
//! - **Typed at the edge**: each adapter parses into its own response structs
//!   before mapping to the canonical `Quote`

mod descriptor;
mod http;
mod traits;

pub mod alpha_vantage;
pub mod finnhub;
pub mod fmp;
pub mod marketdata_app;
pub mod twelve_data;

use std::sync::Arc;

use crate::models::{is_valid_symbol, SearchResult};

pub use descriptor::{
    is_placeholder_key, mask_key, KeyStatus, ProviderDescriptor, QuotaWindow, MAX_TIMEOUT,
    MIN_TIMEOUT,
};
pub use traits::MarketDataProvider;

/// Upper bound on search results returned by any provider.
pub const MAX_SEARCH_RESULTS: usize = 50;

/// Build the five production adapters in priority order.
///
/// `lookup` resolves an environment variable name to its value; the server
/// passes `std::env::var`, tests pass a map.
pub fn build_default_providers<F>(lookup: F) -> Vec<Arc<dyn MarketDataProvider>>
where
    F: Fn(&str) -> Option<String>,
{
    vec![
        Arc::new(finnhub::FinnhubProvider::new(finnhub::descriptor(lookup(
            finnhub::KEY_ENV,
        )))),
        Arc::new(alpha_vantage::AlphaVantageProvider::new(
            alpha_vantage::descriptor(lookup(alpha_vantage::KEY_ENV)),
        )),
        Arc::new(twelve_data::TwelveDataProvider::new(twelve_data::descriptor(
            lookup(twelve_data::KEY_ENV),
        ))),
        Arc::new(fmp::FmpProvider::new(fmp::descriptor(lookup(fmp::KEY_ENV)))),
        Arc::new(marketdata_app::MarketDataAppProvider::new(
            marketdata_app::descriptor(lookup(marketdata_app::KEY_ENV)),
        )),
    ]
}

/// Uppercase symbols, drop entries whose symbol or name cannot be cached and
/// cap the list.
pub(crate) fn normalize_search_results(results: Vec<SearchResult>) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter_map(|mut result| {
            result.symbol = result.symbol.trim().to_uppercase();
            result.name = result.name.trim().to_string();
            (is_valid_symbol(&result.symbol) && !result.name.is_empty()).then_some(result)
        })
        .take(MAX_SEARCH_RESULTS)
        .collect()
}
