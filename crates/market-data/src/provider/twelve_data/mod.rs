//! Twelve Data market data provider implementation.
//!
//! - Equities via the /quote endpoint
//! - Symbol search via the /symbol_search endpoint
//!
//! Free tier: 800 API credits per day. Errors arrive as HTTP 200 with a
//! `{"code", "message", "status": "error"}` body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Quote, SearchResult, Symbol};
use crate::provider::http::{self, parse_number};
use crate::provider::{normalize_search_results, MarketDataProvider, ProviderDescriptor, QuotaWindow};

pub const PROVIDER_ID: &str = "TWELVE_DATA";
pub const KEY_ENV: &str = "TWELVE_DATA_API_KEY";
const BASE_URL: &str = "https://api.twelvedata.com";

/// Quote response. Numeric fields are strings.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    symbol: Option<String>,
    timestamp: Option<i64>,
    open: Option<String>,
    high: Option<String>,
    low: Option<String>,
    close: Option<String>,
    volume: Option<String>,
    previous_close: Option<String>,
    change: Option<String>,
    percent_change: Option<String>,
    #[serde(flatten)]
    error: ErrorFields,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorFields {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
    #[serde(flatten)]
    error: ErrorFields,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    symbol: String,
    instrument_name: String,
    #[serde(default)]
    exchange: String,
    #[serde(default)]
    instrument_type: String,
    #[serde(default)]
    currency: String,
}

/// Default descriptor: priority 3, 800 calls per UTC day.
pub fn descriptor(api_key: Option<String>) -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_ID, "Twelve Data", BASE_URL)
        .with_key(KEY_ENV, api_key)
        .with_quota(800, QuotaWindow::Daily)
        .with_timeout(Duration::from_secs(8))
        .with_priority(3)
        .with_search(true)
}

/// Twelve Data market data provider.
pub struct TwelveDataProvider {
    client: Client,
    descriptor: ProviderDescriptor,
}

impl TwelveDataProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let client = http::build_client(&descriptor);
        Self { client, descriptor }
    }

    async fn fetch(
        &self,
        endpoint: &str,
        subject: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let api_key = self.descriptor.require_key()?;
        let url = format!("{}{}", self.descriptor.base_url, endpoint);
        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("apikey {}", api_key))
            .query(params);
        http::send(PROVIDER_ID, subject, request).await
    }
}

#[async_trait]
impl MarketDataProvider for TwelveDataProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        self.descriptor.require_key().map(|_| ())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        debug!("Fetching quote for {} from Twelve Data", symbol);
        let body = self
            .fetch("/quote", symbol.as_str(), &[("symbol", symbol.as_str())])
            .await?;
        parse_quote(symbol, &body)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        debug!("Searching Twelve Data for '{}'", query);
        let body = self
            .fetch("/symbol_search", query, &[("symbol", query), ("outputsize", "30")])
            .await?;
        parse_search(&body)
    }
}

/// Map the in-body error code onto our taxonomy.
fn check_error(error: &ErrorFields, subject: &str) -> Result<(), MarketDataError> {
    let is_error = error.status.as_deref() == Some("error") || error.code.is_some();
    if !is_error {
        return Ok(());
    }
    let message = error
        .message
        .clone()
        .unwrap_or_else(|| format!("error code {}", error.code.unwrap_or_default()));

    Err(match error.code {
        Some(429) => MarketDataError::ProviderRateLimited {
            provider: PROVIDER_ID.to_string(),
        },
        Some(401) | Some(403) => MarketDataError::ProviderUnavailable {
            provider: PROVIDER_ID.to_string(),
            reason: message,
        },
        Some(400) | Some(404) if message.to_lowercase().contains("not found") || error.code == Some(404) => {
            MarketDataError::SymbolNotFound {
                provider: PROVIDER_ID.to_string(),
                symbol: subject.to_string(),
            }
        }
        Some(code) if code >= 500 => MarketDataError::ProviderTransportError {
            provider: PROVIDER_ID.to_string(),
            message,
        },
        _ => MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        },
    })
}

fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse = http::parse_json(PROVIDER_ID, body)?;
    check_error(&response.error, symbol.as_str())?;

    let price = match (response.symbol.as_deref(), parse_number(response.close.as_deref())) {
        (Some(_), Some(price)) => price,
        _ => {
            return Err(MarketDataError::SymbolNotFound {
                provider: PROVIDER_ID.to_string(),
                symbol: symbol.to_string(),
            })
        }
    };

    Quote::builder(symbol.as_str(), price)
        .open(parse_number(response.open.as_deref()))
        .high(parse_number(response.high.as_deref()))
        .low(parse_number(response.low.as_deref()))
        .volume(parse_number(response.volume.as_deref()))
        .previous_close(parse_number(response.previous_close.as_deref()))
        .change(parse_number(response.change.as_deref()))
        .change_percent(parse_number(response.percent_change.as_deref()))
        .timestamp(response.timestamp)
        .provider(PROVIDER_ID)
        .build()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        })
}

fn parse_search(body: &str) -> Result<Vec<SearchResult>, MarketDataError> {
    let response: SymbolSearchResponse = http::parse_json(PROVIDER_ID, body)?;
    check_error(&response.error, "")?;

    let results = response
        .data
        .into_iter()
        .map(|item| {
            SearchResult::new(item.symbol, item.instrument_name, item.instrument_type, item.exchange)
                .with_currency(item.currency)
        })
        .collect();
    Ok(normalize_search_results(results))
}
