//! MarketData.app provider implementation.
//!
//! This provider fetches equity quotes from MarketData.app with Bearer token
//! authentication. It has no search endpoint.
//!
//! # API Endpoints
//!
//! - Latest quote: `https://api.marketdata.app/v1/stocks/quotes/{symbol}/`
//!
//! # Response Format
//!
//! The API returns parallel arrays with a status field `s` indicating success
//! ("ok"), no data ("no_data") or an error ("error" plus `errmsg`).

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MarketDataError;
use crate::models::{Quote, Symbol};
use crate::provider::http;
use crate::provider::{MarketDataProvider, ProviderDescriptor, QuotaWindow};

pub const PROVIDER_ID: &str = "MARKETDATA_APP";
pub const KEY_ENV: &str = "MARKETDATA_APP_API_KEY";
const BASE_URL: &str = "https://api.marketdata.app/v1";

/// Response from the quotes endpoint.
#[derive(Debug, Deserialize)]
struct QuotesResponse {
    /// Status: "ok", "no_data" or "error"
    s: String,
    #[serde(default)]
    errmsg: Option<String>,
    #[serde(default)]
    symbol: Option<Vec<String>>,
    /// Last traded price
    #[serde(default)]
    last: Option<Vec<Option<f64>>>,
    /// Mid price, used when there is no last trade
    #[serde(default)]
    mid: Option<Vec<Option<f64>>>,
    #[serde(default)]
    change: Option<Vec<Option<f64>>>,
    /// Change as a fraction (0.0123 = 1.23%)
    #[serde(default)]
    changepct: Option<Vec<Option<f64>>>,
    #[serde(default)]
    volume: Option<Vec<Option<f64>>>,
    /// Unix timestamps of last update
    #[serde(default)]
    updated: Option<Vec<Option<i64>>>,
}

/// Default descriptor: priority 5, 100 calls per UTC day, no search.
pub fn descriptor(api_key: Option<String>) -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_ID, "MarketData.app", BASE_URL)
        .with_key(KEY_ENV, api_key)
        .with_quota(100, QuotaWindow::Daily)
        .with_timeout(Duration::from_secs(8))
        .with_priority(5)
}

/// MarketData.app provider for fetching equity quotes.
pub struct MarketDataAppProvider {
    client: Client,
    descriptor: ProviderDescriptor,
}

impl MarketDataAppProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let client = http::build_client(&descriptor);
        Self { client, descriptor }
    }
}

#[async_trait]
impl MarketDataProvider for MarketDataAppProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        self.descriptor.require_key().map(|_| ())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let api_key = self.descriptor.require_key()?;
        let url = format!(
            "{}/stocks/quotes/{}/",
            self.descriptor.base_url,
            urlencoding::encode(symbol.as_str())
        );
        let request = self.client.get(&url).bearer_auth(api_key);
        let body = http::send(PROVIDER_ID, symbol.as_str(), request).await?;
        parse_quote(symbol, &body)
    }
}

fn first<T: Copy>(values: &Option<Vec<Option<T>>>) -> Option<T> {
    values.as_ref().and_then(|v| v.first().copied().flatten())
}

fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, MarketDataError> {
    let response: QuotesResponse = http::parse_json(PROVIDER_ID, body)?;

    match response.s.as_str() {
        "ok" => {}
        "no_data" => {
            return Err(MarketDataError::SymbolNotFound {
                provider: PROVIDER_ID.to_string(),
                symbol: symbol.to_string(),
            })
        }
        _ => {
            let message = response.errmsg.unwrap_or_else(|| response.s.clone());
            warn!("MarketData.app error for {}: {}", symbol, message);
            let lower = message.to_lowercase();
            return Err(if lower.contains("limit") {
                MarketDataError::ProviderRateLimited {
                    provider: PROVIDER_ID.to_string(),
                }
            } else if lower.contains("token") || lower.contains("auth") {
                MarketDataError::ProviderUnavailable {
                    provider: PROVIDER_ID.to_string(),
                    reason: message,
                }
            } else if lower.contains("symbol") {
                MarketDataError::SymbolNotFound {
                    provider: PROVIDER_ID.to_string(),
                    symbol: symbol.to_string(),
                }
            } else {
                MarketDataError::InvalidResponse {
                    provider: PROVIDER_ID.to_string(),
                    message,
                }
            });
        }
    }

    if let Some(returned) = response.symbol.as_ref().and_then(|s| s.first()) {
        if !returned.eq_ignore_ascii_case(symbol.as_str()) {
            return Err(MarketDataError::InvalidResponse {
                provider: PROVIDER_ID.to_string(),
                message: format!("asked for {} but got {}", symbol, returned),
            });
        }
    }

    let price = first(&response.last)
        .or_else(|| first(&response.mid))
        .ok_or_else(|| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message: "quote has no last or mid price".to_string(),
        })?;

    let change = first(&response.change);
    // Previous close is not reported; recover it from the change
    let previous_close = change.map(|c| price - c);

    Quote::builder(symbol.as_str(), price)
        .change(change)
        .change_percent(first(&response.changepct).map(|pct| pct * 100.0))
        .previous_close(previous_close)
        .volume(first(&response.volume))
        .timestamp(first(&response.updated))
        .provider(PROVIDER_ID)
        .build()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        })
}
