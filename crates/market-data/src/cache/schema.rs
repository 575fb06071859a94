//! Structural validation of cache payloads.
//!
//! Anything keyed by user-influenced input (symbols, search queries) passes
//! through here before it is stored. A payload that fails is rejected whole.

use serde_json::Value;

use crate::models::{is_valid_symbol, Quote, SearchResult};

use super::CachePayload;

/// Longest free-text field kept in the cache.
pub const MAX_TEXT_LEN: usize = 200;
/// Longest cache key.
pub const MAX_KEY_LEN: usize = 256;
/// Most search results stored under one key.
pub const MAX_SEARCH_RESULTS: usize = 50;
/// Most quotes stored under one batch key.
pub const MAX_BATCH_QUOTES: usize = 20;
/// Most keys in any JSON object inside a payload.
pub const MAX_OBJECT_KEYS: usize = 100;
/// Deepest nesting allowed in a payload.
pub const MAX_DEPTH: usize = 8;

const MAX_PRICE: f64 = 1e9;
const MAX_MARKET_CAP: f64 = 1e16;
const MAX_RATIO: f64 = 1e7;
const MAX_VOLUME: u64 = 1_000_000_000_000;
/// Year 3000, in seconds since epoch.
const MAX_TIMESTAMP: i64 = 32_503_680_000;

/// Check a cache key: non-empty, bounded, printable.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("empty cache key".to_string());
    }
    if key.len() > MAX_KEY_LEN {
        return Err(format!("cache key longer than {} bytes", MAX_KEY_LEN));
    }
    if key.chars().any(char::is_control) {
        return Err("cache key contains control characters".to_string());
    }
    Ok(())
}

/// Validate a payload against its schema and the generic JSON bounds.
pub fn validate_payload(payload: &CachePayload) -> Result<(), String> {
    match payload {
        CachePayload::Quote(quote) => validate_quote(quote)?,
        CachePayload::Search(results) => {
            if results.len() > MAX_SEARCH_RESULTS {
                return Err(format!(
                    "{} search results exceeds limit of {}",
                    results.len(),
                    MAX_SEARCH_RESULTS
                ));
            }
            results.iter().try_for_each(validate_search_result)?;
        }
        CachePayload::Batch(quotes) => {
            if quotes.len() > MAX_BATCH_QUOTES {
                return Err(format!(
                    "{} batch quotes exceeds limit of {}",
                    quotes.len(),
                    MAX_BATCH_QUOTES
                ));
            }
            quotes.iter().try_for_each(validate_quote)?;
        }
    }

    let value = serde_json::to_value(payload).map_err(|e| format!("unserializable payload: {}", e))?;
    validate_value(&value, 0)
}

fn validate_quote(quote: &Quote) -> Result<(), String> {
    quote.check_invariants()?;

    check_upper("price", Some(quote.price), MAX_PRICE)?;
    for (name, value) in [
        ("high", quote.high),
        ("low", quote.low),
        ("open", quote.open),
        ("previousClose", quote.previous_close),
        ("eps", quote.eps),
    ] {
        check_upper(name, value, MAX_PRICE)?;
    }
    check_upper("marketCap", quote.market_cap, MAX_MARKET_CAP)?;
    check_upper("pe", quote.pe_ratio, MAX_RATIO)?;
    if quote.change.abs() > MAX_PRICE {
        return Err(format!("change {} out of bounds", quote.change));
    }
    if quote.change_percent.abs() > MAX_RATIO {
        return Err(format!("changePercent {} out of bounds", quote.change_percent));
    }
    if quote.volume.is_some_and(|v| v > MAX_VOLUME) {
        return Err("volume out of bounds".to_string());
    }
    if quote.timestamp > MAX_TIMESTAMP {
        return Err(format!("timestamp {} out of bounds", quote.timestamp));
    }
    check_text("provider", &quote.provider)?;
    if quote.provider.is_empty() {
        return Err("quote has no provider".to_string());
    }
    Ok(())
}

fn validate_search_result(result: &SearchResult) -> Result<(), String> {
    if !is_valid_symbol(&result.symbol) {
        return Err(format!("malformed symbol '{}' in search results", result.symbol));
    }
    if result.name.is_empty() {
        return Err(format!("search result {} has no name", result.symbol));
    }
    check_text("name", &result.name)?;
    check_text("type", &result.asset_type)?;
    check_text("exchange", &result.exchange)?;
    if let Some(currency) = &result.currency {
        check_text("currency", currency)?;
    }
    Ok(())
}

fn check_upper(name: &str, value: Option<f64>, max: f64) -> Result<(), String> {
    match value {
        Some(v) if v > max => Err(format!("{} {} out of bounds", name, v)),
        _ => Ok(()),
    }
}

fn check_text(name: &str, value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(format!("{} longer than {} characters", name, MAX_TEXT_LEN));
    }
    Ok(())
}

/// Generic bounds on the serialized form: object width, nesting depth,
/// string length and number finiteness.
fn validate_value(value: &Value, depth: usize) -> Result<(), String> {
    if depth > MAX_DEPTH {
        return Err(format!("payload nested deeper than {}", MAX_DEPTH));
    }
    match value {
        Value::Object(map) => {
            if map.len() > MAX_OBJECT_KEYS {
                return Err(format!("object with {} keys exceeds {}", map.len(), MAX_OBJECT_KEYS));
            }
            map.values().try_for_each(|v| validate_value(v, depth + 1))
        }
        Value::Array(items) => items.iter().try_for_each(|v| validate_value(v, depth + 1)),
        Value::String(s) if s.chars().count() > MAX_TEXT_LEN => {
            Err(format!("string longer than {} characters", MAX_TEXT_LEN))
        }
        Value::Number(n) if n.as_f64().is_some_and(|f| !f.is_finite()) => {
            Err("non-finite number".to_string())
        }
        _ => Ok(()),
    }
}
