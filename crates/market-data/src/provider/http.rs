//! HTTP plumbing shared by the provider adapters.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::MarketDataError;

use super::descriptor::ProviderDescriptor;

/// Build a client whose per-request timeout comes from the descriptor.
pub(crate) fn build_client(descriptor: &ProviderDescriptor) -> Client {
    Client::builder()
        .timeout(descriptor.effective_timeout())
        .user_agent(concat!("alfalyzer-market-data/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a request and return the body of a 2xx response.
///
/// `subject` is the symbol or query the call is about; it is carried into a
/// `SymbolNotFound` for HTTP 404.
pub(crate) async fn send(
    provider: &str,
    subject: &str,
    request: RequestBuilder,
) -> Result<String, MarketDataError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            MarketDataError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            MarketDataError::ProviderTransportError {
                provider: provider.to_string(),
                message: format!("Request failed: {}", strip_query(&e.to_string())),
            }
        }
    })?;

    let status = response.status();
    debug!("{} responded with HTTP {}", provider, status);

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(provider, subject, status, &body));
    }

    response.text().await.map_err(|e| {
        if e.is_timeout() {
            MarketDataError::Timeout {
                provider: provider.to_string(),
            }
        } else {
            MarketDataError::ProviderTransportError {
                provider: provider.to_string(),
                message: format!("Failed to read response: {}", e),
            }
        }
    })
}

/// Map a non-2xx status to a typed error.
pub(crate) fn classify_status(
    provider: &str,
    subject: &str,
    status: StatusCode,
    body: &str,
) -> MarketDataError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => MarketDataError::ProviderRateLimited {
            provider: provider.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => MarketDataError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: format!("API key rejected (HTTP {})", status.as_u16()),
        },
        StatusCode::NOT_FOUND => MarketDataError::SymbolNotFound {
            provider: provider.to_string(),
            symbol: subject.to_string(),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => MarketDataError::Timeout {
            provider: provider.to_string(),
        },
        s if s.is_server_error() => MarketDataError::ProviderTransportError {
            provider: provider.to_string(),
            message: format!("HTTP {}", s.as_u16()),
        },
        s => MarketDataError::InvalidResponse {
            provider: provider.to_string(),
            message: format!("HTTP {} - {}", s.as_u16(), snippet(body)),
        },
    }
}

/// Deserialize a provider body into its intermediate struct.
pub(crate) fn parse_json<T: DeserializeOwned>(provider: &str, body: &str) -> Result<T, MarketDataError> {
    serde_json::from_str(body).map_err(|e| MarketDataError::InvalidResponse {
        provider: provider.to_string(),
        message: format!("Failed to parse response: {}", e),
    })
}

/// Parse a numeric field some providers send as a string ("1.23", "0.45%").
pub(crate) fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim().trim_end_matches('%').trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") || raw == "-" {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

// Error strings from reqwest embed the URL, which can carry an apikey param.
fn strip_query(message: &str) -> String {
    match message.find('?') {
        Some(idx) => {
            let rest = &message[idx..];
            let end = rest.find([' ', ')']).unwrap_or(rest.len());
            format!("{}{}", &message[..idx], &rest[end..])
        }
        None => message.to_string(),
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status("FMP", "AAPL", StatusCode::TOO_MANY_REQUESTS, ""),
            MarketDataError::ProviderRateLimited { .. }
        ));
        assert!(matches!(
            classify_status("FMP", "AAPL", StatusCode::UNAUTHORIZED, ""),
            MarketDataError::ProviderUnavailable { .. }
        ));
        assert!(matches!(
            classify_status("FMP", "AAPL", StatusCode::NOT_FOUND, ""),
            MarketDataError::SymbolNotFound { .. }
        ));
        assert!(matches!(
            classify_status("FMP", "AAPL", StatusCode::BAD_GATEWAY, ""),
            MarketDataError::ProviderTransportError { .. }
        ));
        assert!(matches!(
            classify_status("FMP", "AAPL", StatusCode::BAD_REQUEST, "nope"),
            MarketDataError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some("150.25")), Some(150.25));
        assert_eq!(parse_number(Some(" -1.2345% ")), Some(-1.2345));
        assert_eq!(parse_number(Some("None")), None);
        assert_eq!(parse_number(Some("")), None);
        assert_eq!(parse_number(Some("abc")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn test_strip_query_hides_api_key() {
        let msg = "error sending request for url (https://x.io/quote?symbol=A&apikey=SECRET)";
        let stripped = strip_query(msg);
        assert!(!stripped.contains("SECRET"));
        assert!(stripped.starts_with("error sending request for url (https://x.io/quote"));
    }
}
