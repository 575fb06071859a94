//! Static provider configuration.
//!
//! A [`ProviderDescriptor`] is built once at startup from the environment and
//! never mutated afterwards.

use std::time::Duration;

use serde::Serialize;

use crate::errors::MarketDataError;

/// Bounds every adapter's per-call timeout must fall within.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval over which a provider's call limit is enforced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuotaWindow {
    /// Resets at the next UTC midnight.
    Daily,
    /// Resets this long after the window was opened.
    Rolling(Duration),
}

impl QuotaWindow {
    pub fn label(&self) -> String {
        match self {
            Self::Daily => "daily".to_string(),
            Self::Rolling(d) => format!("rolling_{}s", d.as_secs()),
        }
    }
}

/// Static per-adapter configuration.
#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    /// Stable identifier used in logs, quotas and failure maps (e.g. "FINNHUB").
    pub id: &'static str,
    /// Human readable name.
    pub name: &'static str,
    pub base_url: String,
    /// Environment variable the key is read from.
    pub key_env: &'static str,
    pub api_key: Option<String>,
    /// Calls allowed per quota window.
    pub quota_limit: u32,
    pub quota_window: QuotaWindow,
    pub timeout: Duration,
    /// Lower values are tried first.
    pub priority: u8,
    pub supports_search: bool,
}

impl ProviderDescriptor {
    /// Descriptor with no key, an unlimited daily quota and the maximum
    /// timeout. Adapters and fakes refine it with the `with_*` methods.
    pub fn new(id: &'static str, name: &'static str, base_url: impl Into<String>) -> Self {
        Self {
            id,
            name,
            base_url: base_url.into(),
            key_env: "",
            api_key: None,
            quota_limit: u32::MAX,
            quota_window: QuotaWindow::Daily,
            timeout: MAX_TIMEOUT,
            priority: 10,
            supports_search: false,
        }
    }

    pub fn with_key(mut self, key_env: &'static str, api_key: Option<String>) -> Self {
        self.key_env = key_env;
        self.api_key = api_key;
        self
    }

    pub fn with_quota(mut self, limit: u32, window: QuotaWindow) -> Self {
        self.quota_limit = limit;
        self.quota_window = window;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_search(mut self, supports_search: bool) -> Self {
        self.supports_search = supports_search;
        self
    }

    /// Point the adapter at a different host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Timeout clamped into the allowed per-call range.
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
    }

    pub fn has_usable_key(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|key| !is_placeholder_key(key))
            .unwrap_or(false)
    }

    /// The API key, or `ProviderUnavailable` if it is absent or a placeholder.
    pub fn require_key(&self) -> Result<&str, MarketDataError> {
        match self.api_key.as_deref() {
            None => Err(MarketDataError::ProviderUnavailable {
                provider: self.id.to_string(),
                reason: format!("{} not configured", self.key_env),
            }),
            Some(key) if is_placeholder_key(key) => Err(MarketDataError::ProviderUnavailable {
                provider: self.id.to_string(),
                reason: format!("{} is a placeholder value", self.key_env),
            }),
            Some(key) => Ok(key.trim()),
        }
    }

    /// Key status for operational output. Never exposes the full key.
    pub fn key_status(&self) -> KeyStatus {
        KeyStatus {
            env: self.key_env,
            configured: self.has_usable_key(),
            masked: self
                .api_key
                .as_deref()
                .filter(|_| self.has_usable_key())
                .map(mask_key),
        }
    }
}

/// Masked view of a provider key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyStatus {
    pub env: &'static str,
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<String>,
}

/// Returns true for empty keys and the usual template values.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return true;
    }
    matches!(
        key.as_str(),
        "demo" | "test" | "your_api_key" | "your-api-key" | "changeme"
    ) || key.starts_with("your_")
        || key.starts_with("your-")
        || key.starts_with("xxx")
}

/// Keep the first and last two characters of a key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 4), tail)
}
