//! Search result models for symbol lookup.

use serde::{Deserialize, Serialize};

/// Result from a ticker/symbol search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Symbol/ticker (e.g., "AAPL", "BRK.B")
    pub symbol: String,

    /// Display name (e.g., "Apple Inc")
    pub name: String,

    /// Asset type as reported by the provider (e.g., "Common Stock", "ETF")
    #[serde(rename = "type")]
    pub asset_type: String,

    /// Exchange name (e.g., "NASDAQ")
    pub exchange: String,

    /// Trading currency, when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl SearchResult {
    /// Create a new search result with required fields.
    pub fn new(
        symbol: impl Into<String>,
        name: impl Into<String>,
        asset_type: impl Into<String>,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            asset_type: asset_type.into(),
            exchange: exchange.into(),
            currency: None,
        }
    }

    /// Set the currency.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        let currency = currency.into();
        if !currency.is_empty() {
            self.currency = Some(currency);
        }
        self
    }
}

/// Search results as handed to consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub cached: bool,
}

impl SearchOutcome {
    pub fn count(&self) -> usize {
        self.results.len()
    }
}
