use std::collections::BTreeMap;
use std::{net::SocketAddr, time::Duration};

use alfalyzer_market_data::provider::{
    alpha_vantage, finnhub, fmp, marketdata_app, twelve_data,
};
use alfalyzer_market_data::{CacheConfig, ResolverConfig};
use anyhow::Context;

use crate::auth::decode_secret_key;

/// Deployment mode. Development exposes per-provider error details.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }
}

pub struct Config {
    pub listen_addr: SocketAddr,
    pub cors_allow: Vec<String>,
    pub request_timeout: Duration,
    pub environment: Environment,
    pub jwt_secret: Option<Vec<u8>>,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub warm_on_start: bool,
    /// Provider key env var name to value, for the variables that are set.
    pub provider_keys: BTreeMap<&'static str, String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or unparsable numeric
    /// values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr: SocketAddr = lookup("MDS_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3001".to_string())
            .parse()
            .context("Invalid MDS_LISTEN_ADDR")?;
        let cors_allow = lookup("MDS_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms = number(&lookup, "MDS_REQUEST_TIMEOUT_MS", 30_000);
        let environment = lookup("MDS_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Production);
        let jwt_secret = lookup("MDS_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .map(|s| decode_secret_key(&s))
            .transpose()
            .context("Invalid MDS_JWT_SECRET")?;

        let cache = CacheConfig {
            capacity: number(&lookup, "MDS_CACHE_CAPACITY", 1000) as usize,
            sweep_interval: Duration::from_secs(number(&lookup, "MDS_CACHE_SWEEP_SECS", 60)),
        };
        let resolver = ResolverConfig {
            quote_ttl: Duration::from_secs(number(&lookup, "MDS_QUOTE_TTL_SECS", 60)),
            search_ttl: Duration::from_secs(number(&lookup, "MDS_SEARCH_TTL_SECS", 300)),
            ..ResolverConfig::default()
        };
        let warm_on_start = lookup("MDS_WARM_ON_START")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let provider_keys = [
            finnhub::KEY_ENV,
            alpha_vantage::KEY_ENV,
            twelve_data::KEY_ENV,
            fmp::KEY_ENV,
            marketdata_app::KEY_ENV,
        ]
        .into_iter()
        .filter_map(|name| lookup(name).map(|value| (name, value)))
        .collect();

        Ok(Self {
            listen_addr,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            environment,
            jwt_secret,
            cache,
            resolver,
            warm_on_start,
            provider_keys,
        })
    }

    pub fn expose_error_details(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// Positive integer from `name`, or `default`.
fn number<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen_addr.port(), 3001);
        assert_eq!(config.cors_allow, vec!["*".to_string()]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.environment, Environment::Production);
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.resolver.quote_ttl, Duration::from_secs(60));
        assert_eq!(config.resolver.search_ttl, Duration::from_secs(300));
        assert!(!config.warm_on_start);
        assert!(config.provider_keys.is_empty());
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = config(&[
            ("MDS_CACHE_CAPACITY", "lots"),
            ("MDS_QUOTE_TTL_SECS", "-5"),
            ("MDS_SEARCH_TTL_SECS", "120"),
        ])
        .unwrap();
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.resolver.quote_ttl, Duration::from_secs(60));
        assert_eq!(config.resolver.search_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_bad_listen_addr_is_an_error() {
        assert!(config(&[("MDS_LISTEN_ADDR", "not-an-addr")]).is_err());
    }

    #[test]
    fn test_environment_and_keys() {
        let config = config(&[
            ("MDS_ENV", "development"),
            ("MDS_WARM_ON_START", "true"),
            ("FINNHUB_API_KEY", "abc123"),
            ("MDS_CORS_ALLOW_ORIGINS", "http://a.test, http://b.test"),
        ])
        .unwrap();
        assert!(config.expose_error_details());
        assert!(config.warm_on_start);
        assert_eq!(config.provider_keys.get("FINNHUB_API_KEY").map(String::as_str), Some("abc123"));
        assert_eq!(config.cors_allow.len(), 2);
    }

    #[test]
    fn test_jwt_secret_must_be_32_bytes() {
        assert!(config(&[("MDS_JWT_SECRET", "short")]).is_err());
        let config = config(&[("MDS_JWT_SECRET", "a2tra2tra2tra2tra2tra2tra2tra2tra2tra2tra2s=")]).unwrap();
        assert_eq!(config.jwt_secret.map(|s| s.len()), Some(32));
    }
}
