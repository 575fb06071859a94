//! Operational status and live diagnostics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::Symbol;
use crate::provider::KeyStatus;
use crate::registry::{ProbeResult, ProbeStatus, ProviderHealth, QuotaStatus, QuoteResolver};

/// Symbol probed by diagnostics when none is given.
pub const DEFAULT_CANARY: &str = "AAPL";

/// Static configuration and observed health of one provider.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub id: String,
    pub name: String,
    pub priority: u8,
    pub supports_search: bool,
    pub api_key: KeyStatus,
    pub health: ProviderHealth,
}

/// Everything `status()` reports. Never triggers a provider call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub providers: Vec<ProviderStatus>,
    pub quotas: Vec<QuotaStatus>,
    pub cache_stats: CacheStats,
    pub generated_at: DateTime<Utc>,
}

/// Result of probing every provider with one canary symbol.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub canary: String,
    pub results: Vec<ProbeResult>,
    pub passed: usize,
    pub total: usize,
    pub success: bool,
    pub tested_at: DateTime<Utc>,
}

/// Read-only view over the resolver's shared state.
#[derive(Clone)]
pub struct StatusReporter {
    resolver: Arc<QuoteResolver>,
}

impl StatusReporter {
    pub fn new(resolver: Arc<QuoteResolver>) -> Self {
        Self { resolver }
    }

    pub fn status(&self) -> ServiceStatus {
        let ids = self.resolver.provider_ids();
        let health = self.resolver.health().snapshot(&ids);

        let providers = self
            .resolver
            .providers()
            .iter()
            .zip(health)
            .map(|(provider, health)| {
                let d = provider.descriptor();
                ProviderStatus {
                    id: d.id.to_string(),
                    name: d.name.to_string(),
                    priority: d.priority,
                    supports_search: d.supports_search,
                    api_key: d.key_status(),
                    health,
                }
            })
            .collect();

        ServiceStatus {
            providers,
            quotas: self.resolver.quota().snapshot(),
            cache_stats: self.resolver.cache().stats(),
            generated_at: Utc::now(),
        }
    }

    /// Probe every provider once with `canary`. Not for the request hot
    /// path: each probe is a real call that counts against quota.
    pub async fn diagnostics(&self, canary: &Symbol) -> DiagnosticsReport {
        let results = self.resolver.probe_all(canary).await;
        let passed = results
            .iter()
            .filter(|r| r.status == ProbeStatus::Ok)
            .count();
        let total = results.len();

        info!("Diagnostics with {}: {}/{} providers passed", canary, passed, total);

        DiagnosticsReport {
            canary: canary.to_string(),
            results,
            passed,
            total,
            success: passed > 0,
            tested_at: Utc::now(),
        }
    }
}
