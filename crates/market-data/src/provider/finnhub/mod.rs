//! Finnhub market data provider implementation.
//!
//! This module provides market data from Finnhub API:
//! - Equities via the /quote endpoint
//! - Symbol search via the /search endpoint
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Quote, SearchResult, Symbol};
use crate::provider::http;
use crate::provider::{normalize_search_results, MarketDataProvider, ProviderDescriptor, QuotaWindow};

pub const PROVIDER_ID: &str = "FINNHUB";
pub const KEY_ENV: &str = "FINNHUB_API_KEY";
const BASE_URL: &str = "https://finnhub.io/api/v1";

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /search endpoint
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchItem>,
}

/// Individual search result item
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    /// Full description/name
    description: String,
    /// Symbol for API calls
    symbol: String,
    /// Security type (e.g., "Common Stock", "ETF")
    #[serde(rename = "type", default)]
    security_type: String,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Default descriptor: priority 1, 60 calls per rolling minute.
pub fn descriptor(api_key: Option<String>) -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_ID, "Finnhub", BASE_URL)
        .with_key(KEY_ENV, api_key)
        .with_quota(60, QuotaWindow::Rolling(Duration::from_secs(60)))
        .with_timeout(Duration::from_secs(8))
        .with_priority(1)
        .with_search(true)
}

/// Finnhub market data provider.
pub struct FinnhubProvider {
    client: Client,
    descriptor: ProviderDescriptor,
}

impl FinnhubProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let client = http::build_client(&descriptor);
        Self { client, descriptor }
    }

    /// Make a GET request to the Finnhub API.
    async fn fetch(
        &self,
        endpoint: &str,
        subject: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let api_key = self.descriptor.require_key()?;
        let url = format!("{}{}", self.descriptor.base_url, endpoint);

        // API key goes in a header rather than the query string
        let request = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", api_key)
            .query(params);

        debug!("Finnhub request: {} with {} params", endpoint, params.len());
        http::send(PROVIDER_ID, subject, request).await
    }
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        self.descriptor.require_key().map(|_| ())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        debug!("Fetching quote for {} from Finnhub", symbol);
        let body = self.fetch("/quote", symbol.as_str(), &[("symbol", symbol.as_str())]).await?;
        parse_quote(symbol, &body)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        debug!("Searching Finnhub for '{}'", query);
        let body = self.fetch("/search", query, &[("q", query)]).await?;
        parse_search(&body)
    }
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, MarketDataError> {
    if let Ok(ErrorResponse { error: Some(message) }) = serde_json::from_str::<ErrorResponse>(body) {
        return Err(map_error_message(symbol.as_str(), message));
    }

    let response: QuoteResponse = http::parse_json(PROVIDER_ID, body)?;

    // Finnhub answers unknown symbols with an all-zero payload instead of an error
    let price = response.c.unwrap_or(0.0);
    if price == 0.0 && response.t.unwrap_or(0) == 0 {
        return Err(MarketDataError::SymbolNotFound {
            provider: PROVIDER_ID.to_string(),
            symbol: symbol.to_string(),
        });
    }

    Quote::builder(symbol.as_str(), price)
        .change(response.d)
        .change_percent(response.dp)
        .high(response.h)
        .low(response.l)
        .open(response.o)
        .previous_close(response.pc)
        .timestamp(response.t)
        .provider(PROVIDER_ID)
        .build()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        })
}

fn parse_search(body: &str) -> Result<Vec<SearchResult>, MarketDataError> {
    if let Ok(ErrorResponse { error: Some(message) }) = serde_json::from_str::<ErrorResponse>(body) {
        return Err(map_error_message("", message));
    }

    let response: SearchResponse = http::parse_json(PROVIDER_ID, body)?;
    let results = response
        .result
        .into_iter()
        .map(|item| {
            let exchange = exchange_from_symbol(&item.symbol);
            SearchResult::new(
                item.symbol,
                item.description,
                map_security_type(&item.security_type),
                exchange,
            )
        })
        .collect();
    Ok(normalize_search_results(results))
}

fn map_error_message(subject: &str, message: String) -> MarketDataError {
    let lower = message.to_lowercase();
    if lower.contains("limit") {
        MarketDataError::ProviderRateLimited {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("api key") || lower.contains("token") {
        MarketDataError::ProviderUnavailable {
            provider: PROVIDER_ID.to_string(),
            reason: message,
        }
    } else if lower.contains("symbol") && !subject.is_empty() {
        MarketDataError::SymbolNotFound {
            provider: PROVIDER_ID.to_string(),
            symbol: subject.to_string(),
        }
    } else {
        MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Map Finnhub security type to a display type.
fn map_security_type(finnhub_type: &str) -> String {
    match finnhub_type.to_lowercase().as_str() {
        "common stock" | "stock" => "Stock".to_string(),
        "etf" | "etp" => "ETF".to_string(),
        "adr" => "ADR".to_string(),
        "reit" => "REIT".to_string(),
        "preferred stock" | "preferred" => "Preferred Stock".to_string(),
        "" => "Unknown".to_string(),
        _ => finnhub_type.to_string(),
    }
}

/// Finnhub encodes non-US listings as a suffix ("SHOP.TO").
fn exchange_from_symbol(symbol: &str) -> String {
    match symbol.rsplit_once('.') {
        Some((_, suffix)) if suffix.len() >= 2 => suffix.to_string(),
        _ => "US".to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
