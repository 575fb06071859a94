use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::errors::MarketDataError;

/// Maximum ticker length accepted anywhere in the crate.
pub const MAX_SYMBOL_LEN: usize = 10;

lazy_static! {
    static ref SYMBOL_PATTERN: Regex =
        Regex::new(r"^[A-Z0-9\-.]{1,10}$").expect("symbol pattern is a valid regex");
}

/// Returns true if `symbol` already is in canonical form.
pub fn is_valid_symbol(symbol: &str) -> bool {
    SYMBOL_PATTERN.is_match(symbol)
}

/// A ticker symbol that has been trimmed, uppercased and checked against
/// `^[A-Z0-9\-.]{1,10}$`.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize and validate raw user input.
    pub fn parse(raw: &str) -> Result<Self, MarketDataError> {
        let normalized = raw.trim().to_uppercase();
        if is_valid_symbol(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(MarketDataError::InvalidSymbol(truncate_for_display(raw)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key for the single-quote entry of this symbol.
    pub fn quote_key(&self) -> String {
        format!("quote:{}", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Rejected input is echoed back in errors; keep it short.
fn truncate_for_display(raw: &str) -> String {
    raw.chars().take(32).collect()
}
