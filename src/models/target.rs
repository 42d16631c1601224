//! Subscription targets and the channels they expand into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::Channel;
use crate::CoinscopeError;

/// Candle granularity of the live feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveInterval {
    #[serde(rename = "1s")]
    OneSecond,
    #[default]
    #[serde(rename = "1m")]
    OneMinute,
}

impl LiveInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveInterval::OneSecond => "1s",
            LiveInterval::OneMinute => "1m",
        }
    }

    /// On-chain OHLCV `(timeframe, aggregate)` pair for this interval.
    pub fn granularity(&self) -> (&'static str, u32) {
        match self {
            LiveInterval::OneSecond => ("second", 1),
            LiveInterval::OneMinute => ("minute", 1),
        }
    }
}

impl fmt::Display for LiveInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiveInterval {
    type Err = CoinscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1s" => Ok(LiveInterval::OneSecond),
            "1m" => Ok(LiveInterval::OneMinute),
            other => Err(CoinscopeError::Config(format!(
                "unsupported live interval {other}, expected 1s or 1m"
            ))),
        }
    }
}

/// What a chart is currently subscribed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTarget {
    pub coin_id: String,
    /// Pool identifier in `network_address` form; empty when unknown.
    pub pool_id: String,
    pub live_interval: LiveInterval,
}

impl ChannelTarget {
    pub fn new(
        coin_id: impl Into<String>,
        pool_id: impl Into<String>,
        live_interval: LiveInterval,
    ) -> Self {
        Self {
            coin_id: coin_id.into(),
            pool_id: pool_id.into(),
            live_interval,
        }
    }

    /// Pool address in the feed's `network:address` form.
    ///
    /// Only the first `_` separates network from address.
    pub fn pool_address(&self) -> Option<String> {
        if self.pool_id.is_empty() {
            return None;
        }
        Some(self.pool_id.replacen('_', ":", 1))
    }

    /// Expands the target into the channels it needs, price first.
    pub fn subscriptions(&self) -> Vec<ChannelSubscription> {
        let mut subs = vec![ChannelSubscription::Price {
            coin_id: self.coin_id.clone(),
        }];

        if let Some(pool) = self.pool_address() {
            subs.push(ChannelSubscription::PoolTrades { pool: pool.clone() });
            subs.push(ChannelSubscription::PoolCandles {
                pool,
                interval: self.live_interval,
            });
        }

        subs
    }
}

/// One logical channel subscription with its selection payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelSubscription {
    Price { coin_id: String },
    PoolTrades { pool: String },
    PoolCandles { pool: String, interval: LiveInterval },
}

impl ChannelSubscription {
    pub fn channel(&self) -> Channel {
        match self {
            ChannelSubscription::Price { .. } => Channel::Price,
            ChannelSubscription::PoolTrades { .. } => Channel::PoolTrades,
            ChannelSubscription::PoolCandles { .. } => Channel::PoolCandles,
        }
    }

    /// The `data` payload sent after subscribing to select coins or pools.
    pub fn payload(&self) -> Value {
        match self {
            ChannelSubscription::Price { coin_id } => json!({
                "coin_id": [coin_id],
                "action": "set_tokens",
            }),
            ChannelSubscription::PoolTrades { pool } => json!({
                "network_id:pool_addresses": [pool],
                "action": "set_pools",
            }),
            ChannelSubscription::PoolCandles { pool, interval } => json!({
                "network_id:pool_addresses": [pool],
                "interval": interval.as_str(),
                "action": "set_pools",
            }),
        }
    }
}
