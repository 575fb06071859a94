use std::sync::Arc;

use alfalyzer_market_data::{
    build_default_providers, CacheWarmer, HealthTracker, MarketDataProvider, QuotaTracker,
    QuoteResolver, StatusReporter, ValidatedCache,
};
use chrono::{DateTime, Utc};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{auth::TokenVerifier, config::Config};

pub struct AppState {
    pub resolver: Arc<QuoteResolver>,
    pub warmer: CacheWarmer,
    pub reporter: StatusReporter,
    pub auth: Option<Arc<TokenVerifier>>,
    /// Include per-provider failure detail in error bodies.
    pub expose_error_details: bool,
    pub started_at: DateTime<Utc>,
}

pub fn init_tracing() {
    let log_format = std::env::var("MDS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Build state with the five production adapters, keyed from `config`.
pub fn build_state(config: &Config) -> Arc<AppState> {
    let providers = build_default_providers(|name| config.provider_keys.get(name).cloned());
    for provider in &providers {
        let key = provider.descriptor().key_status();
        if key.configured {
            tracing::info!("Provider {} configured ({})", provider.id(), key.env);
        } else {
            tracing::warn!("Provider {} has no usable key; set {}", provider.id(), key.env);
        }
    }
    build_state_with_providers(config, providers)
}

/// Build state around an explicit provider list.
pub fn build_state_with_providers(
    config: &Config,
    providers: Vec<Arc<dyn MarketDataProvider>>,
) -> Arc<AppState> {
    let cache = Arc::new(ValidatedCache::new(&config.cache));
    let quota = Arc::new(QuotaTracker::for_providers(&providers));
    let health = Arc::new(HealthTracker::new());
    let resolver = Arc::new(QuoteResolver::new(
        providers,
        cache,
        quota,
        health,
        config.resolver.clone(),
    ));

    let auth = config
        .jwt_secret
        .as_deref()
        .map(|secret| Arc::new(TokenVerifier::new(secret)));
    if auth.is_none() {
        tracing::warn!("MDS_JWT_SECRET not set; market-data routes are unauthenticated");
    }

    Arc::new(AppState {
        warmer: CacheWarmer::new(resolver.clone()),
        reporter: StatusReporter::new(resolver.clone()),
        resolver,
        auth,
        expose_error_details: config.expose_error_details(),
        started_at: Utc::now(),
    })
}
