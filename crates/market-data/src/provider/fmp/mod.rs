//! Financial Modeling Prep market data provider implementation.
//!
//! - Equities via /api/v3/quote/{symbol} (the only adapter that reports
//!   market cap, EPS and P/E)
//! - Symbol search via /api/v3/search
//!
//! Free tier: 250 calls per day. Successful responses are JSON arrays;
//! errors come back as an object with an `Error Message` field.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{Quote, SearchResult, Symbol};
use crate::provider::http;
use crate::provider::{normalize_search_results, MarketDataProvider, ProviderDescriptor, QuotaWindow};

pub const PROVIDER_ID: &str = "FMP";
pub const KEY_ENV: &str = "FMP_API_KEY";
const BASE_URL: &str = "https://financialmodelingprep.com";

/// Either the data array or an error object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Data(Vec<T>),
    Error {
        #[serde(rename = "Error Message")]
        error_message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    symbol: String,
    price: Option<f64>,
    changes_percentage: Option<f64>,
    change: Option<f64>,
    day_low: Option<f64>,
    day_high: Option<f64>,
    market_cap: Option<f64>,
    volume: Option<f64>,
    open: Option<f64>,
    previous_close: Option<f64>,
    eps: Option<f64>,
    pe: Option<f64>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    symbol: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_short_name: Option<String>,
}

/// Default descriptor: priority 4, 250 calls per UTC day.
pub fn descriptor(api_key: Option<String>) -> ProviderDescriptor {
    ProviderDescriptor::new(PROVIDER_ID, "Financial Modeling Prep", BASE_URL)
        .with_key(KEY_ENV, api_key)
        .with_quota(250, QuotaWindow::Daily)
        .with_timeout(Duration::from_secs(8))
        .with_priority(4)
        .with_search(true)
}

/// Financial Modeling Prep provider.
pub struct FmpProvider {
    client: Client,
    descriptor: ProviderDescriptor,
}

impl FmpProvider {
    pub fn new(descriptor: ProviderDescriptor) -> Self {
        let client = http::build_client(&descriptor);
        Self { client, descriptor }
    }

    async fn fetch(
        &self,
        path: &str,
        subject: &str,
        params: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let api_key = self.descriptor.require_key()?;
        let url = format!("{}{}", self.descriptor.base_url, path);
        let request = self
            .client
            .get(&url)
            .query(params)
            .query(&[("apikey", api_key)]);
        http::send(PROVIDER_ID, subject, request).await
    }
}

#[async_trait]
impl MarketDataProvider for FmpProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        self.descriptor.require_key().map(|_| ())
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        debug!("Fetching quote for {} from FMP", symbol);
        let path = format!("/api/v3/quote/{}", urlencoding::encode(symbol.as_str()));
        let body = self.fetch(&path, symbol.as_str(), &[]).await?;
        parse_quote(symbol, &body)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        debug!("Searching FMP for '{}'", query);
        let body = self
            .fetch("/api/v3/search", query, &[("query", query), ("limit", "50")])
            .await?;
        parse_search(&body)
    }
}

fn map_error_message(message: String) -> MarketDataError {
    let lower = message.to_lowercase();
    if lower.contains("limit") {
        MarketDataError::ProviderRateLimited {
            provider: PROVIDER_ID.to_string(),
        }
    } else if lower.contains("api key") || lower.contains("apikey") {
        MarketDataError::ProviderUnavailable {
            provider: PROVIDER_ID.to_string(),
            reason: message,
        }
    } else {
        MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        }
    }
}

fn parse_quote(symbol: &Symbol, body: &str) -> Result<Quote, MarketDataError> {
    let items = match http::parse_json::<Envelope<QuoteItem>>(PROVIDER_ID, body)? {
        Envelope::Data(items) => items,
        Envelope::Error { error_message } => return Err(map_error_message(error_message)),
    };

    // Unknown symbols yield an empty array
    let item = items
        .into_iter()
        .find(|item| item.symbol.eq_ignore_ascii_case(symbol.as_str()))
        .ok_or_else(|| MarketDataError::SymbolNotFound {
            provider: PROVIDER_ID.to_string(),
            symbol: symbol.to_string(),
        })?;

    let price = item.price.ok_or_else(|| MarketDataError::InvalidResponse {
        provider: PROVIDER_ID.to_string(),
        message: "quote has no price".to_string(),
    })?;

    Quote::builder(symbol.as_str(), price)
        .change(item.change)
        .change_percent(item.changes_percentage)
        .high(item.day_high)
        .low(item.day_low)
        .open(item.open)
        .previous_close(item.previous_close)
        .volume(item.volume)
        .market_cap(item.market_cap)
        .eps(item.eps)
        .pe_ratio(item.pe)
        .timestamp(item.timestamp)
        .provider(PROVIDER_ID)
        .build()
        .map_err(|message| MarketDataError::InvalidResponse {
            provider: PROVIDER_ID.to_string(),
            message,
        })
}

fn parse_search(body: &str) -> Result<Vec<SearchResult>, MarketDataError> {
    let items = match http::parse_json::<Envelope<SearchItem>>(PROVIDER_ID, body)? {
        Envelope::Data(items) => items,
        Envelope::Error { error_message } => return Err(map_error_message(error_message)),
    };

    let results = items
        .into_iter()
        .map(|item| {
            let name = item.name.unwrap_or_else(|| item.symbol.clone());
            SearchResult::new(
                item.symbol,
                name,
                "Stock",
                item.exchange_short_name.unwrap_or_default(),
            )
            .with_currency(item.currency.unwrap_or_default())
        })
        .collect();
    Ok(normalize_search_results(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::parse("AAPL").unwrap()
    }

    #[test]
    fn test_quote_parsing_with_fundamentals() {
        let body = r#"[{
            "symbol": "AAPL", "name": "Apple Inc.", "price": 185.64, "changesPercentage": -3.5787,
            "change": -6.89, "dayLow": 183.89, "dayHigh": 188.44, "yearHigh": 199.62, "yearLow": 128.12,
            "marketCap": 2887174010000, "priceAvg50": 189.3, "volume": 82488674, "avgVolume": 53000000,
            "exchange": "NASDAQ", "open": 187.15, "previousClose": 192.53, "eps": 6.13, "pe": 30.28,
            "earningsAnnouncement": "2024-01-25T00:00:00.000+0000", "sharesOutstanding": 15552800000,
            "timestamp": 1704229201
        }]"#;
        let quote = parse_quote(&aapl(), body).unwrap();
        assert_eq!(quote.price, 185.64);
        assert_eq!(quote.market_cap, Some(2_887_174_010_000.0));
        assert_eq!(quote.eps, Some(6.13));
        assert_eq!(quote.pe_ratio, Some(30.28));
        assert_eq!(quote.volume, Some(82_488_674));
        assert_eq!(quote.provider, "FMP");
    }

    #[test]
    fn test_negative_eps_is_dropped() {
        let body = r#"[{"symbol": "RIVN", "price": 20.5, "previousClose": 21.0, "eps": -5.4, "pe": null}]"#;
        let quote = parse_quote(&Symbol::parse("RIVN").unwrap(), body).unwrap();
        assert_eq!(quote.eps, None);
        assert!((quote.change + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_array_is_not_found() {
        let err = parse_quote(&aapl(), "[]").unwrap_err();
        assert!(matches!(err, MarketDataError::SymbolNotFound { .. }));
    }

    #[test]
    fn test_error_message_limit() {
        let body = r#"{"Error Message": "Limit Reach . Please upgrade your plan or visit our documentation for more details"}"#;
        let err = parse_quote(&aapl(), body).unwrap_err();
        assert!(matches!(err, MarketDataError::ProviderRateLimited { .. }));
    }

    #[test]
    fn test_error_message_invalid_key() {
        let body = r#"{"Error Message": "Invalid API KEY. Please retry or visit our documentation."}"#;
        let err = parse_quote(&aapl(), body).unwrap_err();
        assert!(matches!(err, MarketDataError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_search_parsing() {
        let body = r#"[
            {"symbol": "AAPL", "name": "Apple Inc.", "currency": "USD", "stockExchange": "NASDAQ Global Select", "exchangeShortName": "NASDAQ"},
            {"symbol": "APLE", "name": "Apple Hospitality REIT, Inc.", "currency": "USD", "stockExchange": "New York Stock Exchange", "exchangeShortName": "NYSE"}
        ]"#;
        let results = parse_search(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].exchange, "NASDAQ");
        assert_eq!(results[1].currency.as_deref(), Some("USD"));
    }
}
