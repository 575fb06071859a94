use alfalyzer_market_data::MarketDataError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidSymbol(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Quote not found")]
    QuoteNotFound { details: Option<Value> },
    #[error("Market data temporarily unavailable")]
    Unavailable { details: Option<Value> },
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Map a library error. Per-provider messages are attached only when
    /// `expose_details` is set.
    pub fn from_market(err: MarketDataError, expose_details: bool) -> Self {
        match err {
            MarketDataError::InvalidSymbol(_) => ApiError::InvalidSymbol(err.to_string()),
            MarketDataError::InvalidQuery(reason) => ApiError::BadRequest(reason),
            MarketDataError::AllProvidersFailed { failures } => {
                let details = expose_details
                    .then(|| serde_json::to_value(&failures).ok())
                    .flatten();
                if failures.is_not_found() {
                    ApiError::QuoteNotFound { details }
                } else {
                    ApiError::Unavailable { details }
                }
            }
            other => {
                let details = expose_details.then(|| Value::String(other.to_string()));
                ApiError::Unavailable { details }
            }
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidSymbol(_) => (StatusCode::BAD_REQUEST, "INVALID_SYMBOL"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::QuoteNotFound { .. } => (StatusCode::NOT_FOUND, "QUOTE_NOT_FOUND"),
            ApiError::Unavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "MARKET_DATA_UNAVAILABLE")
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_code();
        if status.is_server_error() {
            tracing::warn!("{} {}: {}", status.as_u16(), error, self);
        }
        let message = self.to_string();
        let details = match self {
            ApiError::QuoteNotFound { details } | ApiError::Unavailable { details } => details,
            _ => None,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            error,
            message,
            details,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alfalyzer_market_data::{FailureKind, ProviderFailures};

    fn failures(kinds: &[(&str, FailureKind)]) -> ProviderFailures {
        let mut failures = ProviderFailures::new();
        for (provider, kind) in kinds {
            failures.insert(*provider, *kind, format!("{} failed", provider));
        }
        failures
    }

    #[test]
    fn test_not_found_when_every_provider_says_so() {
        let err = MarketDataError::AllProvidersFailed {
            failures: failures(&[("A", FailureKind::NotFound), ("B", FailureKind::NotFound)]),
        };
        let api = ApiError::from_market(err, false);
        assert_eq!(api.status_and_code().0, StatusCode::NOT_FOUND);
        assert!(matches!(api, ApiError::QuoteNotFound { details: None }));
    }

    #[test]
    fn test_unavailable_with_details_in_development() {
        let err = MarketDataError::AllProvidersFailed {
            failures: failures(&[("A", FailureKind::NotFound), ("B", FailureKind::Transport)]),
        };
        match ApiError::from_market(err, true) {
            ApiError::Unavailable { details: Some(details) } => {
                assert_eq!(details["B"], "B failed");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_symbol_is_bad_request() {
        let api = ApiError::from_market(MarketDataError::InvalidSymbol("BAD!".into()), false);
        assert_eq!(api.status_and_code(), (StatusCode::BAD_REQUEST, "INVALID_SYMBOL"));
    }
}
