//! REST client for historical and snapshot data.
//!
//! [`GeckoClient`] is a thin parameterized GET with an in-memory response
//! cache. Typed wrappers cover the endpoints the dashboard and the polling
//! fallback read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GeckoConfig;
use crate::models::gecko::{
    Category, CoinDetails, ErrorBody, OhlcvData, OnchainEnvelope, OnchainTradeEntry, Period,
    PoolEntry, SearchCoin, SearchResponse, TrendingCoin, TrendingResponse,
};
use crate::models::{Candle, decode_series};
use crate::{CoinscopeError, Result};

/// Trending lists change slowly upstream.
const TRENDING_TTL: Duration = Duration::from_secs(300);

/// Queries shorter than this are not sent to the search endpoint.
const MIN_SEARCH_LEN: usize = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
struct CachedResponse {
    fetched_at: Instant,
    body: Value,
}

/// HTTP client for the market-data REST API.
#[derive(Debug, Clone)]
pub struct GeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache_ttl: Duration,
    cache: Arc<Mutex<HashMap<String, CachedResponse>>>,
}

impl GeckoClient {
    /// Builds a client from the REST part of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &GeckoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.rest_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            cache_ttl: config.cache_ttl,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// A client sharing this one's connection pool that never serves from cache.
    pub fn uncached(&self) -> Self {
        Self {
            cache_ttl: Duration::ZERO,
            ..self.clone()
        }
    }

    /// GETs `endpoint` with the default cache lifetime.
    ///
    /// # Errors
    ///
    /// See [`GeckoClient::fetch_with_ttl`].
    pub async fn fetch<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        self.fetch_with_ttl(endpoint, params, self.cache_ttl).await
    }

    /// GETs `endpoint`, serving a cached body younger than `ttl`.
    ///
    /// Empty parameter values are left out of the query string. A zero
    /// `ttl` bypasses the cache entirely.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::Api`] with the upstream status and message
    /// on a non-2xx response, [`CoinscopeError::Http`] on transport failure
    /// and [`CoinscopeError::Json`] if the body does not match `T`.
    pub async fn fetch_with_ttl<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        ttl: Duration,
    ) -> Result<T> {
        let value = self.fetch_value(endpoint, params, ttl).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_value(&self, endpoint: &str, params: &[(&str, &str)], ttl: Duration) -> Result<Value> {
        let url = self.build_url(endpoint, params)?;
        let key = url.to_string();

        if !ttl.is_zero() {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(&key)
                && hit.fetched_at.elapsed() < ttl
            {
                debug!(endpoint, "Serving cached response");
                return Ok(hit.body.clone());
            }
        }

        debug!(endpoint, "Fetching");
        let mut request = self.http.get(url).header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header(self.key_header(), key);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .or_else(|| status.canonical_reason().map(String::from))
                .unwrap_or_else(|| "No error message".to_string());
            warn!(endpoint, status = status.as_u16(), %message, "API request failed");
            return Err(CoinscopeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        if !ttl.is_zero() {
            self.cache.lock().await.insert(
                key,
                CachedResponse {
                    fetched_at: Instant::now(),
                    body: body.clone(),
                },
            );
        }

        Ok(body)
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{endpoint}", self.base_url))
            .map_err(|e| CoinscopeError::Config(format!("invalid REST url for {endpoint}: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
                query.append_pair(name, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn key_header(&self) -> &'static str {
        if self.base_url.contains("pro-api") {
            "x-cg-pro-api-key"
        } else {
            "x-cg-demo-api-key"
        }
    }

    /// Coin page with market data, platforms and exchange tickers.
    pub async fn coin(&self, coin_id: &str) -> Result<CoinDetails> {
        self.fetch(
            &format!("/coins/{coin_id}"),
            &[("localization", "false"), ("tickers", "true")],
        )
        .await
    }

    /// Historical OHLC candles for `coin_id` over `period`.
    pub async fn ohlc(&self, coin_id: &str, period: Period) -> Result<Vec<Candle>> {
        self.ohlc_days(coin_id, period.days(), period.interval()).await
    }

    /// Historical OHLC candles for an explicit `days` window.
    ///
    /// # Errors
    ///
    /// Besides request errors, returns [`CoinscopeError::InvalidSeries`] if
    /// the payload is not a valid candle array.
    pub async fn ohlc_days(&self, coin_id: &str, days: &str, interval: Option<&str>) -> Result<Vec<Candle>> {
        let value = self
            .fetch_value(
                &format!("/coins/{coin_id}/ohlc"),
                &[
                    ("vs_currency", "usd"),
                    ("days", days),
                    ("interval", interval.unwrap_or_default()),
                    ("precision", "full"),
                ],
                self.cache_ttl,
            )
            .await?;
        decode_series(&value)
    }

    /// Liquidity pools trading the token at `address` on `network`.
    pub async fn token_pools(&self, network: &str, address: &str) -> Result<Vec<PoolEntry>> {
        let envelope: OnchainEnvelope<Vec<PoolEntry>> = self
            .fetch(&format!("/onchain/networks/{network}/tokens/{address}/pools"), &[])
            .await?;
        Ok(envelope.data)
    }

    /// Recent trades in a pool, newest first.
    pub async fn pool_trades(&self, network: &str, pool: &str) -> Result<Vec<OnchainTradeEntry>> {
        let envelope: OnchainEnvelope<Vec<OnchainTradeEntry>> = self
            .fetch(&format!("/onchain/networks/{network}/pools/{pool}/trades"), &[])
            .await?;
        Ok(envelope.data)
    }

    /// OHLCV buckets of a pool at the given granularity.
    pub async fn pool_ohlcv(
        &self,
        network: &str,
        pool: &str,
        timeframe: &str,
        aggregate: u32,
    ) -> Result<OhlcvData> {
        let aggregate = aggregate.to_string();
        let envelope: OnchainEnvelope<OhlcvData> = self
            .fetch(
                &format!("/onchain/networks/{network}/pools/{pool}/ohlcv/{timeframe}"),
                &[("aggregate", &aggregate)],
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn trending(&self) -> Result<Vec<TrendingCoin>> {
        let response: TrendingResponse = self
            .fetch_with_ttl("/search/trending", &[], TRENDING_TTL)
            .await?;
        Ok(response.coins)
    }

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.fetch("/coins/categories", &[]).await
    }

    /// Coins matching `query`. Short queries return nothing without a request.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchCoin>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(Vec::new());
        }
        let response: SearchResponse = self.fetch("/search", &[("query", query)]).await?;
        Ok(response.coins)
    }
}
