//! Per-provider failure aggregation.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Coarse category of a single provider failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Key missing, placeholder or rejected by the provider.
    Unavailable,
    /// Local quota window has no remaining calls.
    QuotaExhausted,
    /// Provider answered with a rate-limit signal.
    RateLimited,
    /// Timeout or network failure.
    Transport,
    /// Provider does not know the symbol.
    NotFound,
    /// Provider answered with something we could not map to a quote.
    InvalidResponse,
    /// Provider does not offer the requested operation.
    NotSupported,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unavailable => "unavailable",
            Self::QuotaExhausted => "quota_exhausted",
            Self::RateLimited => "rate_limited",
            Self::Transport => "transport",
            Self::NotFound => "not_found",
            Self::InvalidResponse => "invalid_response",
            Self::NotSupported => "not_supported",
        };
        f.write_str(label)
    }
}

/// Why one provider did not produce a result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Failures keyed by provider id, kept in the order providers were tried.
///
/// Serializes as a JSON object `{provider: message}`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ProviderFailures {
    entries: Vec<(String, ProviderFailure)>,
}

impl ProviderFailures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure. A second failure for the same provider replaces the first.
    pub fn insert(&mut self, provider: impl Into<String>, kind: FailureKind, message: impl Into<String>) {
        let provider = provider.into();
        let failure = ProviderFailure {
            kind,
            message: message.into(),
        };
        match self.entries.iter_mut().find(|(id, _)| *id == provider) {
            Some((_, existing)) => *existing = failure,
            None => self.entries.push((provider, failure)),
        }
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderFailure> {
        self.entries
            .iter()
            .find(|(id, _)| id == provider)
            .map(|(_, failure)| failure)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderFailure)> {
        self.entries.iter().map(|(id, failure)| (id.as_str(), failure))
    }

    /// True when at least one provider answered and every provider that
    /// answered said the symbol does not exist. Skips do not count as answers.
    pub fn is_not_found(&self) -> bool {
        let answered: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, f)| {
                !matches!(
                    f.kind,
                    FailureKind::Unavailable | FailureKind::QuotaExhausted | FailureKind::NotSupported
                )
            })
            .collect();
        !answered.is_empty() && answered.iter().all(|(_, f)| f.kind == FailureKind::NotFound)
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(id, f)| format!("{}: {} ({})", id, f.kind, f.message))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

impl Serialize for ProviderFailures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, failure) in &self.entries {
            map.serialize_entry(id, &failure.message)?;
        }
        map.end()
    }
}
