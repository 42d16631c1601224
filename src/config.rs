//! Application configuration loaded from environment variables.
//!
//! The configuration is read once into an [`AppConfig`] value which is then
//! passed explicitly to every component that needs it:
//! - `COINGECKO_WEBSOCKET_URL` - push feed endpoint
//! - `COINGECKO_BASE_URL` - REST endpoint
//! - `COINGECKO_API_KEY` - API key used by both surfaces
//! - `COINGECKO_CACHE_TTL_SECS` - REST response cache lifetime
//! - `COINGECKO_RECONNECT_MAX_ATTEMPTS` - give up after this many failed connects

use std::time::Duration;

use crate::CoinscopeError;

/// Default push feed endpoint.
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://stream.coingecko.com/v1";

/// Default REST endpoint.
pub const DEFAULT_REST_BASE_URL: &str = "https://api.coingecko.com/api/v3";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(45);
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gecko: GeckoConfig,
}

/// Market-data provider configuration values.
#[derive(Debug, Clone)]
pub struct GeckoConfig {
    pub websocket_url: String,
    pub rest_base_url: String,
    pub api_key: Option<String>,
    /// Lifetime of cached REST responses.
    pub cache_ttl: Duration,
    /// Period of the polling fallback.
    pub poll_interval: Duration,
    /// How long a subscribe may stay unconfirmed before it is resent.
    pub confirm_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for GeckoConfig {
    fn default() -> Self {
        Self {
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            api_key: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl GeckoConfig {
    /// Returns the push feed URL with the API key attached as a query parameter.
    pub fn stream_url(&self) -> String {
        match &self.api_key {
            Some(key) => {
                let sep = if self.websocket_url.contains('?') { '&' } else { '?' };
                format!("{}{sep}x_cg_pro_api_key={key}", self.websocket_url)
            }
            None => self.websocket_url.clone(),
        }
    }
}

/// Exponential backoff settings for the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// Every variable is optional; unset or empty variables fall back to the
/// defaults.
///
/// # Errors
///
/// Returns [`CoinscopeError::Config`] if a URL has the wrong scheme or a
/// numeric variable cannot be parsed.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("COINGECKO_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    if !(websocket_url.starts_with("ws://") || websocket_url.starts_with("wss://")) {
        return Err(CoinscopeError::Config(format!(
            "COINGECKO_WEBSOCKET_URL must use ws:// or wss://, got {websocket_url}"
        )));
    }

    let rest_base_url = non_empty_var("COINGECKO_BASE_URL")
        .unwrap_or_else(|| DEFAULT_REST_BASE_URL.to_string());
    if !(rest_base_url.starts_with("http://") || rest_base_url.starts_with("https://")) {
        return Err(CoinscopeError::Config(format!(
            "COINGECKO_BASE_URL must use http:// or https://, got {rest_base_url}"
        )));
    }

    let cache_ttl = match parse_var::<u64>("COINGECKO_CACHE_TTL_SECS")? {
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_CACHE_TTL,
    };

    let reconnect = ReconnectPolicy {
        max_attempts: parse_var::<u32>("COINGECKO_RECONNECT_MAX_ATTEMPTS")?,
        ..ReconnectPolicy::default()
    };

    Ok(AppConfig {
        gecko: GeckoConfig {
            websocket_url,
            rest_base_url: rest_base_url.trim_end_matches('/').to_string(),
            api_key: non_empty_var("COINGECKO_API_KEY"),
            cache_ttl,
            reconnect,
            ..GeckoConfig::default()
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    non_empty_var(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| CoinscopeError::Config(format!("{name} is not a valid number: {raw}")))
        })
        .transpose()
}
