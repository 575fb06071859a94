//! Per-provider health tracking.
//!
//! Records the outcome of every dispatched provider call. Unlike a circuit
//! breaker this never blocks a provider; it only feeds status output.
//!
//! - **Healthy**: last call succeeded (or no calls yet).
//! - **Degraded**: at least one consecutive failure.
//! - **Failing**: three or more consecutive failures.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

/// Consecutive failures before a provider is reported as degraded.
const DEGRADED_THRESHOLD: u32 = 1;

/// Consecutive failures before a provider is reported as failing.
const FAILING_THRESHOLD: u32 = 3;

/// Coarse health of a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Failing,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failing => write!(f, "failing"),
        }
    }
}

/// Snapshot of one provider's health.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: String,
    pub state: HealthState,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
}

impl ProviderHealth {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            state: HealthState::Healthy,
            successes: 0,
            failures: 0,
            consecutive_failures: 0,
            last_error: None,
            last_success_at: None,
            last_failure_at: None,
            last_latency_ms: None,
        }
    }

    fn refresh_state(&mut self) {
        self.state = if self.consecutive_failures >= FAILING_THRESHOLD {
            HealthState::Failing
        } else if self.consecutive_failures >= DEGRADED_THRESHOLD {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
    }
}

/// Thread-safe health registry keyed by provider id.
#[derive(Debug, Default)]
pub struct HealthTracker {
    entries: Mutex<HashMap<String, ProviderHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, ProviderHealth>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Health tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record_success(&self, provider: &str, latency: Duration) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));

        if entry.consecutive_failures > 0 {
            debug!(
                "Provider '{}' recovered after {} failures",
                provider, entry.consecutive_failures
            );
        }
        entry.successes += 1;
        entry.consecutive_failures = 0;
        entry.last_success_at = Some(Utc::now());
        entry.last_latency_ms = Some(latency.as_millis() as u64);
        entry.refresh_state();
    }

    pub fn record_failure(&self, provider: &str, error: &str, latency: Duration) {
        let mut entries = self.lock_entries();
        let entry = entries
            .entry(provider.to_string())
            .or_insert_with(|| ProviderHealth::new(provider));

        entry.failures += 1;
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_error = Some(error.to_string());
        entry.last_failure_at = Some(Utc::now());
        entry.last_latency_ms = Some(latency.as_millis() as u64);
        let previous = entry.state;
        entry.refresh_state();

        if previous != HealthState::Failing && entry.state == HealthState::Failing {
            warn!(
                "Provider '{}' is failing ({} consecutive failures): {}",
                provider, entry.consecutive_failures, error
            );
        }
    }

    pub fn state(&self, provider: &str) -> HealthState {
        self.lock_entries()
            .get(provider)
            .map(|h| h.state)
            .unwrap_or(HealthState::Healthy)
    }

    /// Health for the given providers, in the given order. Providers that
    /// have never been called are reported healthy with zero counts.
    pub fn snapshot(&self, providers: &[&str]) -> Vec<ProviderHealth> {
        let entries = self.lock_entries();
        providers
            .iter()
            .map(|id| {
                entries
                    .get(*id)
                    .cloned()
                    .unwrap_or_else(|| ProviderHealth::new(id))
            })
            .collect()
    }
}
