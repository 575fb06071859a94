use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ProviderFailures;

use super::symbol::is_valid_symbol;

/// Canonical market snapshot for one symbol.
///
/// Invariants (checked by [`Quote::check_invariants`]): `price` is finite and
/// strictly positive; every optional price-like field is finite and
/// non-negative when present; `change` and `change_percent` are finite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Ticker symbol, uppercase
    pub symbol: String,

    /// Last traded / current price (required)
    pub price: f64,

    /// Absolute change versus previous close
    pub change: f64,

    /// Percentage change versus previous close, may be negative
    pub change_percent: f64,

    /// Day high
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,

    /// Day low
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,

    /// Opening price
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,

    /// Previous session close
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,

    /// Traded volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    /// Market capitalization in quote currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,

    /// Earnings per share
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,

    /// Price / earnings ratio
    #[serde(rename = "pe", alias = "peRatio", default, skip_serializing_if = "Option::is_none")]
    pub pe_ratio: Option<f64>,

    /// Quote time, seconds since epoch
    pub timestamp: i64,

    /// Provider that produced the quote (FINNHUB, ALPHA_VANTAGE, etc.)
    pub provider: String,

    /// When the quote entered the cache
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Quote {
    /// Start building a quote from the two fields every provider must supply.
    pub fn builder(symbol: impl Into<String>, price: f64) -> QuoteBuilder {
        QuoteBuilder::new(symbol, price)
    }

    /// Tag the quote with the provider that produced it.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Stamp the cache insertion time.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    /// Check the canonical quote invariants.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !is_valid_symbol(&self.symbol) {
            return Err(format!("malformed symbol '{}'", self.symbol));
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(format!("price must be finite and positive, got {}", self.price));
        }
        if !self.change.is_finite() {
            return Err(format!("change must be finite, got {}", self.change));
        }
        if !self.change_percent.is_finite() {
            return Err(format!(
                "changePercent must be finite, got {}",
                self.change_percent
            ));
        }
        let optionals = [
            ("high", self.high),
            ("low", self.low),
            ("open", self.open),
            ("previousClose", self.previous_close),
            ("marketCap", self.market_cap),
            ("eps", self.eps),
            ("pe", self.pe_ratio),
        ];
        for (name, value) in optionals {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{} must be finite and non-negative, got {}", name, v));
                }
            }
        }
        if self.timestamp < 0 {
            return Err(format!("timestamp must be non-negative, got {}", self.timestamp));
        }
        Ok(())
    }
}

/// Compute `(change, change_percent)` from a price and previous close.
///
/// A zero (or non-finite) previous close yields a zero percentage rather than
/// a division by zero.
pub fn derive_change(price: f64, previous_close: f64) -> (f64, f64) {
    let change = price - previous_close;
    if previous_close == 0.0 || !previous_close.is_finite() || !change.is_finite() {
        return (if change.is_finite() { change } else { 0.0 }, 0.0);
    }
    (change, change / previous_close * 100.0)
}

/// Builder used by adapters to assemble a [`Quote`] from loosely-typed
/// provider fields.
///
/// Optional fields that are non-finite or negative are dropped rather than
/// failing the whole quote. Missing change values are derived from the
/// previous close.
#[derive(Clone, Debug)]
pub struct QuoteBuilder {
    symbol: String,
    price: f64,
    change: Option<f64>,
    change_percent: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    open: Option<f64>,
    previous_close: Option<f64>,
    volume: Option<u64>,
    market_cap: Option<f64>,
    eps: Option<f64>,
    pe_ratio: Option<f64>,
    timestamp: Option<i64>,
    provider: String,
}

impl QuoteBuilder {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change: None,
            change_percent: None,
            high: None,
            low: None,
            open: None,
            previous_close: None,
            volume: None,
            market_cap: None,
            eps: None,
            pe_ratio: None,
            timestamp: None,
            provider: String::new(),
        }
    }

    pub fn change(mut self, change: Option<f64>) -> Self {
        self.change = change;
        self
    }

    pub fn change_percent(mut self, change_percent: Option<f64>) -> Self {
        self.change_percent = change_percent;
        self
    }

    pub fn high(mut self, high: Option<f64>) -> Self {
        self.high = high;
        self
    }

    pub fn low(mut self, low: Option<f64>) -> Self {
        self.low = low;
        self
    }

    pub fn open(mut self, open: Option<f64>) -> Self {
        self.open = open;
        self
    }

    pub fn previous_close(mut self, previous_close: Option<f64>) -> Self {
        self.previous_close = previous_close;
        self
    }

    pub fn volume(mut self, volume: Option<f64>) -> Self {
        self.volume = volume
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.round() as u64);
        self
    }

    pub fn market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap;
        self
    }

    pub fn eps(mut self, eps: Option<f64>) -> Self {
        self.eps = eps;
        self
    }

    pub fn pe_ratio(mut self, pe_ratio: Option<f64>) -> Self {
        self.pe_ratio = pe_ratio;
        self
    }

    pub fn timestamp(mut self, timestamp: Option<i64>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Assemble and validate the quote.
    pub fn build(self) -> Result<Quote, String> {
        let previous_close = non_negative(self.previous_close);

        let (change, change_percent) = match (finite(self.change), finite(self.change_percent)) {
            (Some(change), Some(pct)) => (change, pct),
            (Some(change), None) => {
                // Recover the percentage from the implied previous close.
                let base = previous_close.unwrap_or(self.price - change);
                let pct = if base != 0.0 && base.is_finite() {
                    change / base * 100.0
                } else {
                    0.0
                };
                (change, pct)
            }
            (None, pct) => match previous_close {
                Some(pc) => {
                    let (change, derived) = derive_change(self.price, pc);
                    (change, pct.unwrap_or(derived))
                }
                None => (0.0, pct.unwrap_or(0.0)),
            },
        };

        let quote = Quote {
            symbol: self.symbol.trim().to_uppercase(),
            price: self.price,
            change,
            change_percent,
            high: non_negative(self.high),
            low: non_negative(self.low),
            open: non_negative(self.open),
            previous_close,
            volume: self.volume,
            market_cap: non_negative(self.market_cap),
            eps: non_negative(self.eps),
            pe_ratio: non_negative(self.pe_ratio),
            timestamp: self
                .timestamp
                .filter(|ts| *ts > 0)
                .unwrap_or_else(|| Utc::now().timestamp()),
            provider: self.provider,
            fetched_at: None,
        };

        quote.check_invariants()?;
        Ok(quote)
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// A quote as handed to consumers, with whether it was served from cache.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedQuote {
    pub quote: Quote,
    pub cached: bool,
    /// Providers that failed or were skipped before one answered. Always
    /// empty for cache hits.
    pub failures: ProviderFailures,
}

/// Outcome of a batch resolution: successes in request order plus per-symbol
/// failure reasons.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchQuotes {
    pub quotes: Vec<Quote>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(skip)]
    pub cached: bool,
}
