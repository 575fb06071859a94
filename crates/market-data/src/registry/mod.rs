//! Provider registry module.
//!
//! This module provides orchestration for market data providers, including:
//! - Static priority ordering and fallback
//! - Per-provider request quotas
//! - Health tracking from observed outcomes
//! - Cache-first resolution of quotes, batches and searches

mod health;
mod quota;
mod resolver;

pub use health::{HealthState, HealthTracker, ProviderHealth};
pub use quota::{QuotaStatus, QuotaTracker};
pub use resolver::{
    normalize_query, ProbeResult, ProbeStatus, QuoteResolver, ResolverConfig, DEFAULT_BATCH_LIMIT,
    DEFAULT_QUOTE_TTL, DEFAULT_SEARCH_TTL, MAX_QUERY_LEN,
};
