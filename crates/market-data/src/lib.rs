//! Alfalyzer Market Data Crate
//!
//! This crate resolves stock quotes and symbol searches across a fixed set of
//! third-party market data providers, behind a bounded, validated cache.
//!
//! # Overview
//!
//! The market data crate supports:
//! - Five providers in static priority order: Finnhub, Alpha Vantage,
//!   Twelve Data, Financial Modeling Prep, MarketData.app
//! - Per-provider request quotas with daily or rolling windows
//! - Fallback across providers with every failure aggregated
//! - A schema-validated, sanitizing LRU cache with per-entry TTL
//! - Best-effort cache warming and operational diagnostics
//!
//! # Architecture
//!
//! ```text
//!                          +------------------+
//!   raw symbol / query --> |  QuoteResolver   | --> ValidatedCache (hit?)
//!                          +------------------+
//!                                  |  miss
//!                                  v
//!                          +------------------+
//!                          |  QuotaTracker    |  (skip exhausted providers)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |    Provider      |  (Finnhub, AlphaVantage, etc.)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |     Quote        |  (cached, returned)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`Symbol`] - Validated ticker symbol
//! - [`Quote`] - Canonical quote shared by every provider
//! - [`QuoteResolver`] - Cache-first fallback resolution
//! - [`ValidatedCache`] - Bounded store guarding against poisoning
//! - [`MarketDataError`] - Error taxonomy with retry classification

pub mod cache;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod status;
pub mod warmer;

pub use cache::{spawn_sweeper, CacheConfig, CachePayload, CacheStats, SweeperHandle, ValidatedCache};
pub use errors::{FailureKind, MarketDataError, ProviderFailures, RetryClass};
pub use models::{BatchQuotes, Quote, ResolvedQuote, SearchOutcome, SearchResult, Symbol};

// Re-export provider types
pub use provider::alpha_vantage::AlphaVantageProvider;
pub use provider::finnhub::FinnhubProvider;
pub use provider::fmp::FmpProvider;
pub use provider::marketdata_app::MarketDataAppProvider;
pub use provider::twelve_data::TwelveDataProvider;
pub use provider::{build_default_providers, MarketDataProvider, ProviderDescriptor, QuotaWindow};

// Re-export registry types
pub use registry::{
    HealthState, HealthTracker, ProbeResult, ProbeStatus, ProviderHealth, QuotaStatus,
    QuotaTracker, QuoteResolver, ResolverConfig,
};

pub use status::{DiagnosticsReport, ServiceStatus, StatusReporter, DEFAULT_CANARY};
pub use warmer::{CacheWarmer, DEFAULT_WARM_SYMBOLS};
