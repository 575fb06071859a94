//! Per-provider call quota tracking.
//!
//! Each configured provider gets a counter with a call limit and a reset
//! instant. The counter rolls forward lazily: every operation first checks
//! `now >= reset_at` and, if so, zeroes `used` and advances `reset_at` to the
//! next window boundary.
//!
//! The tracker is in-memory and resets on process restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::provider::{MarketDataProvider, QuotaWindow};

/// Point-in-time view of one provider's quota.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub provider: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub window: String,
}

/// Counter for a single provider.
#[derive(Debug)]
struct QuotaCounter {
    used: u32,
    limit: u32,
    window: QuotaWindow,
    reset_at: DateTime<Utc>,
}

impl QuotaCounter {
    fn new(limit: u32, window: QuotaWindow, now: DateTime<Utc>) -> Self {
        Self {
            used: 0,
            limit,
            window,
            reset_at: next_reset(window, now),
        }
    }

    /// Reset the window if it has elapsed. Returns true on reset.
    fn roll(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.used = 0;
        self.reset_at = next_reset(self.window, now);
        true
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    fn status(&self, provider: &str) -> QuotaStatus {
        QuotaStatus {
            provider: provider.to_string(),
            used: self.used,
            limit: self.limit,
            remaining: self.remaining(),
            reset_at: self.reset_at,
            window: self.window.label(),
        }
    }
}

/// Next window boundary after `now`.
fn next_reset(window: QuotaWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    match window {
        QuotaWindow::Daily => {
            let tomorrow = now
                .date_naive()
                .succ_opt()
                .unwrap_or_else(|| now.date_naive());
            Utc.from_utc_datetime(&tomorrow.and_time(NaiveTime::MIN))
        }
        QuotaWindow::Rolling(length) => {
            let length = ChronoDuration::from_std(length).unwrap_or_else(|_| ChronoDuration::days(1));
            now + length
        }
    }
}

#[derive(Debug, Default)]
struct QuotaTable {
    /// Registration order, used for snapshots.
    order: Vec<String>,
    counters: HashMap<String, QuotaCounter>,
}

/// Process-wide quota tracker.
///
/// Thread-safe: all reads and writes of a counter happen under one lock, so
/// concurrent increments are never lost. Providers that were never configured
/// are treated as unlimited.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    table: Mutex<QuotaTable>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker with every provider's quota registered from its descriptor.
    pub fn for_providers(providers: &[Arc<dyn MarketDataProvider>]) -> Self {
        let tracker = Self::new();
        for provider in providers {
            let d = provider.descriptor();
            tracker.configure(d.id, d.quota_limit, d.quota_window);
        }
        tracker
    }

    /// Lock the table, recovering from poison if necessary.
    ///
    /// A poisoned quota table at worst miscounts a call, which is better
    /// than failing every resolution.
    fn lock_table(&self) -> MutexGuard<'_, QuotaTable> {
        self.table.lock().unwrap_or_else(|poisoned| {
            warn!("Quota tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register or reconfigure a provider. Reconfiguring starts a fresh window.
    pub fn configure(&self, provider: &str, limit: u32, window: QuotaWindow) {
        self.configure_at(provider, limit, window, Utc::now());
    }

    pub fn configure_at(&self, provider: &str, limit: u32, window: QuotaWindow, now: DateTime<Utc>) {
        let mut table = self.lock_table();
        if !table.counters.contains_key(provider) {
            table.order.push(provider.to_string());
        }
        table
            .counters
            .insert(provider.to_string(), QuotaCounter::new(limit, window, now));
        debug!("Quota for '{}' set to {} per {}", provider, limit, window.label());
    }

    /// Whether the provider has at least one call left in the current window.
    pub fn can_attempt(&self, provider: &str) -> bool {
        self.can_attempt_at(provider, Utc::now())
    }

    pub fn can_attempt_at(&self, provider: &str, now: DateTime<Utc>) -> bool {
        let mut table = self.lock_table();
        match table.counters.get_mut(provider) {
            Some(counter) => {
                if counter.roll(now) {
                    info!("Quota window for '{}' reset", provider);
                }
                counter.remaining() > 0
            }
            None => true,
        }
    }

    /// Count one dispatched call against the provider.
    pub fn record_attempt(&self, provider: &str) {
        self.record_attempt_at(provider, Utc::now());
    }

    pub fn record_attempt_at(&self, provider: &str, now: DateTime<Utc>) {
        let mut table = self.lock_table();
        if let Some(counter) = table.counters.get_mut(provider) {
            counter.roll(now);
            counter.used = counter.used.saturating_add(1);
        }
    }

    /// Check and count in one step.
    ///
    /// Returns false, without counting, when the window has no calls left.
    /// This is what the resolver uses so two concurrent resolutions cannot
    /// both take the last call.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.try_acquire_at(provider, Utc::now())
    }

    pub fn try_acquire_at(&self, provider: &str, now: DateTime<Utc>) -> bool {
        let mut table = self.lock_table();
        let Some(counter) = table.counters.get_mut(provider) else {
            return true;
        };
        if counter.roll(now) {
            info!("Quota window for '{}' reset", provider);
        }
        if counter.remaining() == 0 {
            debug!("Quota for '{}' exhausted until {}", provider, counter.reset_at);
            return false;
        }
        counter.used += 1;
        true
    }

    pub fn status(&self, provider: &str) -> Option<QuotaStatus> {
        self.status_at(provider, Utc::now())
    }

    pub fn status_at(&self, provider: &str, now: DateTime<Utc>) -> Option<QuotaStatus> {
        let mut table = self.lock_table();
        table.counters.get_mut(provider).map(|counter| {
            counter.roll(now);
            counter.status(provider)
        })
    }

    /// Status of every configured provider in registration order.
    pub fn snapshot(&self) -> Vec<QuotaStatus> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<QuotaStatus> {
        let mut table = self.lock_table();
        let QuotaTable { order, counters } = &mut *table;
        order
            .iter()
            .filter_map(|id| {
                counters.get_mut(id).map(|counter| {
                    counter.roll(now);
                    counter.status(id)
                })
            })
            .collect()
    }
}
