//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all market data operations
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`ProviderFailures`]: The per-provider map carried by an aggregated failure

mod failures;
mod retry;

pub use failures::{FailureKind, ProviderFailure, ProviderFailures};
pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur during market data operations.
///
/// Provider-level variants are produced by adapters and the quota gate; the
/// resolver folds them into [`MarketDataError::AllProvidersFailed`] and never
/// lets a single one escape.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The symbol does not match `^[A-Z0-9\-.]{1,10}$` after normalization.
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// The search query is empty or too long.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The provider cannot be used: key absent, placeholder, or rejected.
    #[error("Provider unavailable: {provider} - {reason}")]
    ProviderUnavailable {
        /// The provider that cannot be used
        provider: String,
        /// Why it cannot be used
        reason: String,
    },

    /// The provider rate limited the request (HTTP 429 or an equivalent payload).
    #[error("Rate limited: {provider}")]
    ProviderRateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The local quota window for the provider is used up.
    #[error("Quota exhausted: {provider}")]
    QuotaExhausted {
        /// The provider with no remaining calls
        provider: String,
    },

    /// A network error occurred while communicating with a provider.
    #[error("Transport error: {provider} - {message}")]
    ProviderTransportError {
        /// The provider that could not be reached
        provider: String,
        /// Underlying error message
        message: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The provider does not know the symbol.
    #[error("Symbol not found: {symbol} ({provider})")]
    SymbolNotFound {
        /// The provider that rejected the symbol
        provider: String,
        /// The symbol requested
        symbol: String,
    },

    /// The provider answered with a payload that does not map to a valid quote.
    #[error("Invalid response: {provider} - {message}")]
    InvalidResponse {
        /// The provider that returned the payload
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// The provider does not support the operation.
    #[error("Operation '{operation}' not supported by {provider}")]
    NotSupported {
        /// The operation requested
        operation: String,
        /// The provider asked
        provider: String,
    },

    /// Every provider failed or was skipped.
    #[error("All providers failed: {}", failures.summary())]
    AllProvidersFailed {
        /// Per-provider reasons in the order providers were tried
        failures: ProviderFailures,
    },

    /// A payload was rejected at the cache boundary.
    #[error("Cache validation failed: {message}")]
    CacheValidationFailed {
        /// Description of the validation failure
        message: String,
    },
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use alfalyzer_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::ProviderRateLimited { provider: "FINNHUB".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::Transient);
    ///
    /// let error = MarketDataError::InvalidSymbol("BAD!".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::InvalidSymbol(_)
            | Self::InvalidQuery(_)
            | Self::AllProvidersFailed { .. }
            | Self::CacheValidationFailed { .. } => RetryClass::Never,

            Self::ProviderRateLimited { .. }
            | Self::QuotaExhausted { .. }
            | Self::ProviderTransportError { .. }
            | Self::Timeout { .. } => RetryClass::Transient,

            Self::ProviderUnavailable { .. }
            | Self::SymbolNotFound { .. }
            | Self::InvalidResponse { .. }
            | Self::NotSupported { .. } => RetryClass::Permanent,
        }
    }

    /// Whether the same provider may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Transient
    }

    /// Category used when this error is folded into [`ProviderFailures`].
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::ProviderUnavailable { .. } => FailureKind::Unavailable,
            Self::QuotaExhausted { .. } => FailureKind::QuotaExhausted,
            Self::ProviderRateLimited { .. } => FailureKind::RateLimited,
            Self::ProviderTransportError { .. } | Self::Timeout { .. } => FailureKind::Transport,
            Self::SymbolNotFound { .. } => FailureKind::NotFound,
            Self::NotSupported { .. } => FailureKind::NotSupported,
            Self::InvalidSymbol(_)
            | Self::InvalidQuery(_)
            | Self::InvalidResponse { .. }
            | Self::AllProvidersFailed { .. }
            | Self::CacheValidationFailed { .. } => FailureKind::InvalidResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_symbol_never_retries() {
        let error = MarketDataError::InvalidSymbol("BAD!".to_string());
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_rate_limited_is_transient() {
        let error = MarketDataError::ProviderRateLimited {
            provider: "FINNHUB".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
        assert!(error.is_retryable());
        assert_eq!(error.failure_kind(), FailureKind::RateLimited);
    }

    #[test]
    fn test_timeout_is_transport_failure() {
        let error = MarketDataError::Timeout {
            provider: "ALPHA_VANTAGE".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
        assert_eq!(error.failure_kind(), FailureKind::Transport);
    }

    #[test]
    fn test_unavailable_is_permanent() {
        let error = MarketDataError::ProviderUnavailable {
            provider: "FMP".to_string(),
            reason: "API key not configured".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
        assert!(!error.is_retryable());
        assert_eq!(error.failure_kind(), FailureKind::Unavailable);
    }

    #[test]
    fn test_symbol_not_found_is_permanent() {
        let error = MarketDataError::SymbolNotFound {
            provider: "TWELVE_DATA".to_string(),
            symbol: "ZZZZ".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Permanent);
        assert_eq!(error.failure_kind(), FailureKind::NotFound);
    }

    #[test]
    fn test_all_providers_failed_never_retries() {
        let error = MarketDataError::AllProvidersFailed {
            failures: ProviderFailures::new(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_error_display() {
        let error = MarketDataError::InvalidSymbol("BAD!".to_string());
        assert_eq!(format!("{}", error), "Invalid symbol: BAD!");

        let error = MarketDataError::ProviderRateLimited {
            provider: "FINNHUB".to_string(),
        };
        assert_eq!(format!("{}", error), "Rate limited: FINNHUB");

        let mut failures = ProviderFailures::new();
        failures.insert("FINNHUB", FailureKind::Transport, "timeout");
        let error = MarketDataError::AllProvidersFailed { failures };
        assert_eq!(
            format!("{}", error),
            "All providers failed: FINNHUB: transport (timeout)"
        );
    }
}
