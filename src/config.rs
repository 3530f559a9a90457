//! Environment-driven configuration: `.env` loading, typed getters and the
//! settings consumed by the server and CLI.

use anyhow::Context;
use std::str::FromStr;
use std::sync::Once;
use std::time::Duration;
use tracing::{info, warn};

use crate::fetch::CachePolicy;

static INIT: Once = Once::new();

/// Load `.env` from the working directory, falling back to the crate root.
/// Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_ok() {
            return;
        }
        let candidate = concat!(env!("CARGO_MANIFEST_DIR"), "/.env");
        let _ = dotenv::from_filename(candidate);
    });
}

/// Optional env var; unset and blank are both `None`.
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parsed env var. Unset falls back to `default`; an unparseable value is
/// logged and also falls back.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match env_opt(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target = "config", key, value = %raw, "ignoring unparseable value");
                default
            }
        },
        None => default,
    }
}

/// Mask values whose key looks like a credential.
pub fn redact_value(key: &str, value: &str) -> String {
    let k = key.to_ascii_uppercase();
    if ["KEY", "SECRET", "TOKEN", "PASSWORD"]
        .iter()
        .any(|marker| k.contains(marker))
    {
        if value.is_empty() {
            String::new()
        } else {
            "***".to_string()
        }
    } else {
        value.to_string()
    }
}

/// Credentials and location of the upstream product API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: String,
    pub site_url: Option<String>,
    /// `None` when `PRODUCTS_API_URL` or `PRODUCTS_API_KEY` is missing.
    pub upstream: Option<UpstreamConfig>,
    pub cache: CachePolicy,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        init_env();

        let host = env_opt("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match env_opt("API_PORT") {
            Some(raw) => raw.parse().context("Invalid API_PORT")?,
            None => 8080,
        };
        let allowed_origins = env_opt("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string());

        let upstream = match (env_opt("PRODUCTS_API_URL"), env_opt("PRODUCTS_API_KEY")) {
            (Some(base_url), Some(api_key)) => {
                url::Url::parse(&base_url).context("Invalid PRODUCTS_API_URL")?;
                Some(UpstreamConfig {
                    base_url,
                    api_key,
                    timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECS", 15u64),
                })
            }
            _ => None,
        };

        let cache = CachePolicy {
            stale_after: Duration::from_secs(env_parse("CACHE_STALE_MINUTES", 30u64) * 60),
            evict_after: Duration::from_secs(env_parse("CACHE_EVICT_MINUTES", 60u64) * 60),
        };

        Ok(Self {
            host,
            port,
            allowed_origins,
            site_url: env_opt("SITE_URL"),
            upstream,
            cache,
            sweep_interval: Duration::from_secs(env_parse("CACHE_SWEEP_SECS", 300u64).max(1)),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log a redacted snapshot of the effective configuration.
    pub fn log_snapshot(&self) {
        let upstream_url = self.upstream.as_ref().map(|u| u.base_url.as_str()).unwrap_or("");
        let api_key = self.upstream.as_ref().map(|u| u.api_key.as_str()).unwrap_or("");
        info!(
            target = "config",
            bind = %self.bind_addr(),
            site_url = self.site_url.as_deref().unwrap_or("<request host>"),
            products_api_url = upstream_url,
            products_api_key = %redact_value("PRODUCTS_API_KEY", api_key),
            stale_after_secs = self.cache.stale_after.as_secs(),
            evict_after_secs = self.cache.evict_after.as_secs(),
            "configuration snapshot"
        );
        if self.upstream.is_none() {
            warn!(
                target = "config",
                "PRODUCTS_API_URL / PRODUCTS_API_KEY not set; catalog endpoints will fail"
            );
        }
    }
}
