//! Alpha Vantage market data provider implementation.
//!
//! This module provides market data from Alpha Vantage:
//! - Equities via the GLOBAL_QUOTE function
//! - Symbol search via the SYMBOL_SEARCH function
//!
//! Note: Alpha Vantage free tier is limited to 25 API calls per day.
//! Rate limits are signalled in the body (`Note` / `Information`) with HTTP 200.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{Quote, SearchResult, Symbol};
use crate::provider::http::{self, parse_number};
use crate::provider::{normalize_search_results, MarketDataProvider, ProviderDescriptor, QuotaWindow};

pub const PROVIDER_ID: &str = "ALPHA_VANTAGE";
pub const KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";
const BASE_URL: &str = "https://www.alphavantage.co";

// Response structures for Alpha Vantage API

/// Fields every Alpha Vantage payload may carry instead of data.
#[derive(Debug, Default, Deserialize)]
struct ApiNotice {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
    #[serde(flatten)]
    notice: ApiNotice,
}

/// All values arrive as strings.
#[derive(Debug, Default, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: Option<String>,
    #[serde(rename = "02. open")]
    open: Option<String>,
    #[serde(rename = "03. high")]
    high: Option<String>,
    #[serde(rename = "04. low")]
    low: Option<String>,
    #[serde(rename = "05. price")]
    price: Option<String>,
    #[serde(rename = "06. volume")]
    volume: Option<String>,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: Option<String>,
    #[serde(rename = "08. previous close")]
    previous_close: Option<String>,
    #[serde(rename = "09. change")]
    change: Option<String>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SymbolSearchResponse {
    #[serde(rename = "bestMatches")]
    best_matches: Option<Vec<SearchMatch>>,
    #[serde(flatten)]
    notice: ApiNotice,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    #[serde(rename = "1. symbol")]
    symbol: String,
    #[serde(rename = "2. name")]
    name: String,
    #[serde(rename = "3. type", default)]
    asset_type: String,
    #[serde(rename = "4. region", default)]
    region: String,
    #[serde(rename = "8. currency", default)]
    currency: String,
}

/// Default descriptor: priority 2, 25 calls per UTC day.
pub fn descriptor(api_key: Option<String>) -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_ID, "Alpha Vantage", BASE_URL)
        .with_key(KEY_ENV, api_key)
        .with_quota(25, QuotaWindow::Daily)
        .with_timeout(Duration::from_secs(10))
        .with_priority(2)
        .with_search(true)
}

/// Alpha Vantage market data provider.
pub struct AlphaVantageProvider {
    client: Client,
    descriptor: ProviderDescriptor,
}

impl AlphaVantageProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let client = http::build_client(&descriptor);
        Self { client, descriptor }
    }

    /// Make a request to the Alpha Vantage query endpoint.
    async fn fetch(&self, subject: &str, params: &[(&str, &str)]) -> Result<String, MarketDataError> {
        let api_key = self.descriptor.require_key()?;
        let url = format!("{}/query", self.descriptor.base_url);

        debug!("Alpha Vantage request: {:?}", params.first().map(|(_, f)| f));

        let request = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", api_key)]);
        http::send(PROVIDER_ID, subject, request).await
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        self.descriptor.require_key().map(|_| ())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        debug!("Fetching quote for {} from Alpha Vantage", symbol);
        let body = self
            .fetch(
                symbol.as_str(),
                &[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())],
            )
            .await?;
        parse_quote(symbol, &body)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        debug!("Searching Alpha Vantage for '{}'", query);
        let body = self
            .fetch(query, &[("function", "SYMBOL_SEARCH"), ("keywords", query)])
            .await?;
        parse_search(&body)
    }
}

/// Check for API-level errors in the response.
fn check_api_notice(notice: &ApiNotice, subject: &str) -> Result<(), MarketDataError> {
    if let Some(ref msg) = notice.error_message {
        if msg.contains("Invalid API call") || msg.to_lowercase().contains("not found") {
            return Err(MarketDataError::SymbolNotFound {
                provider: PROVIDER_ID.to_string(),
                symbol: subject.to_string(),
            });
        }
        return Err(MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message: msg.clone(),
        });
    }

    // Both fields are used for throttling; "Information" also reports bad keys.
    let Some(msg) = notice.note.as_ref().or(notice.information.as_ref()) else {
        return Ok(());
    };

    let lower = msg.to_lowercase();
    if lower.contains("api key") && lower.contains("invalid") {
        return Err(MarketDataError::ProviderUnavailable {
            provider: PROVIDER_ID.to_string(),
            reason: "API key rejected".to_string(),
        });
    }
    if !(lower.contains("call frequency") || lower.contains("rate limit") || lower.contains("requests per")) {
        warn!("Alpha Vantage notice: {}", msg);
    }
    // A notice in place of data means no data this window
    Err(MarketDataError::ProviderRateLimited {
        provider: PROVIDER_ID.to_string(),
    })
}

fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, MarketDataError> {
    let response: GlobalQuoteResponse = http::parse_json(PROVIDER_ID, body)?;
    check_api_notice(&response.notice, symbol.as_str())?;

    // An unknown symbol comes back as an empty "Global Quote" object
    let quote = response.global_quote.unwrap_or_default();
    let price = match parse_number(quote.price.as_deref()) {
        Some(price) if quote.symbol.is_some() => price,
        _ => {
            return Err(MarketDataError::SymbolNotFound {
                provider: PROVIDER_ID.to_string(),
                symbol: symbol.to_string(),
            })
        }
    };

    let timestamp = quote
        .latest_trading_day
        .as_deref()
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| Utc.from_local_datetime(&dt).single())
        .map(|dt| dt.timestamp());

    Quote::builder(symbol.as_str(), price)
        .open(parse_number(quote.open.as_deref()))
        .high(parse_number(quote.high.as_deref()))
        .low(parse_number(quote.low.as_deref()))
        .volume(parse_number(quote.volume.as_deref()))
        .previous_close(parse_number(quote.previous_close.as_deref()))
        .change(parse_number(quote.change.as_deref()))
        .change_percent(parse_number(quote.change_percent.as_deref()))
        .timestamp(timestamp)
        .provider(PROVIDER_ID)
        .build()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        })
}

fn parse_search(body: &str) -> Result<Vec<SearchResult>, MarketDataError> {
    let response: SymbolSearchResponse = http::parse_json(PROVIDER_ID, body)?;
    check_api_notice(&response.notice, "")?;

    let results = response
        .best_matches
        .unwrap_or_default()
        .into_iter()
        .map(|m| SearchResult::new(m.symbol, m.name, m.asset_type, m.region).with_currency(m.currency))
        .collect();
    Ok(normalize_search_results(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ibm() -> Symbol {
        Symbol::parse("IBM").unwrap()
    }

    #[test]
    fn test_descriptor() {
        let d = descriptor(None);
        assert_eq!(d.id, "ALPHA_VANTAGE");
        assert_eq!(d.priority, 2);
        assert_eq!(d.quota_window, QuotaWindow::Daily);
        assert_eq!(d.quota_limit, 25);
    }

    #[test]
    fn test_global_quote_parsing() {
        let body = r#"{
            "Global Quote": {
                "01. symbol": "IBM",
                "02. open": "167.0000",
                "03. high": "168.5000",
                "04. low": "166.2000",
                "05. price": "167.9000",
                "06. volume": "3456789",
                "07. latest trading day": "2024-01-02",
                "08. previous close": "165.9000",
                "09. change": "2.0000",
                "10. change percent": "1.2055%"
            }
        }"#;
        let quote = parse_quote(&ibm(), body).unwrap();
        assert_eq!(quote.price, 167.9);
        assert_eq!(quote.change, 2.0);
        assert_eq!(quote.change_percent, 1.2055);
        assert_eq!(quote.volume, Some(3_456_789));
        assert_eq!(quote.previous_close, Some(165.9));
        assert_eq!(quote.timestamp, 1_704_153_600);
        assert_eq!(quote.provider, "ALPHA_VANTAGE");
    }

    #[test]
    fn test_negative_change_percent() {
        let body = r#"{"Global Quote": {"01. symbol": "IBM", "05. price": "100.0", "08. previous close": "102.0", "09. change": "-2.0", "10. change percent": "-1.9608%"}}"#;
        let quote = parse_quote(&ibm(), body).unwrap();
        assert_eq!(quote.change_percent, -1.9608);
    }

    #[test]
    fn test_empty_global_quote_is_not_found() {
        let err = parse_quote(&ibm(), r#"{"Global Quote": {}}"#).unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_note_is_rate_limited() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let err = parse_quote(&ibm(), body).unwrap_err();
        assert!(matches!(err, MarketDataError::ProviderRateLimited { .. }));
    }

    #[test]
    fn test_information_daily_limit_is_rate_limited() {
        let body = r#"{"Information": "We have detected your API key as XYZ and our standard API rate limit is 25 requests per day."}"#;
        let err = parse_quote(&ibm(), body).unwrap_err();
        assert!(matches!(err, MarketDataError::ProviderRateLimited { .. }));
    }

    #[test]
    fn test_error_message_is_not_found() {
        let body = r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#;
        let err = parse_quote(&ibm(), body).unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_symbol_search_parsing() {
        let body = r#"{
            "bestMatches": [
                {"1. symbol": "TSCO.LON", "2. name": "Tesco PLC", "3. type": "Equity", "4. region": "United Kingdom", "8. currency": "GBX"},
                {"1. symbol": "TSCDY", "2. name": "Tesco PLC", "3. type": "Equity", "4. region": "United States", "8. currency": "USD"}
            ]
        }"#;
        let results = parse_search(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].symbol, "TSCO.LON");
        assert_eq!(results[0].exchange, "United Kingdom");
        assert_eq!(results[1].currency.as_deref(), Some("USD"));
    }
}
