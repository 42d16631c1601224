//! REST API response models.
//!
//! Only the fields the synchronization paths and the dashboard lists read
//! are modelled; everything else in the upstream payloads is ignored.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::trade::{Trade, TradeSide};
use crate::{CoinscopeError, Result};

/// Chart period selectable on the historical view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Period {
    #[default]
    Daily,
    Weekly,
    Monthly,
    ThreeMonths,
    SixMonths,
    Yearly,
    Max,
}

impl Period {
    /// `days` query value for the OHLC endpoint.
    pub fn days(&self) -> &'static str {
        match self {
            Period::Daily => "1",
            Period::Weekly => "7",
            Period::Monthly => "30",
            Period::ThreeMonths => "90",
            Period::SixMonths => "180",
            Period::Yearly => "365",
            Period::Max => "max",
        }
    }

    /// Explicit candle `interval`, if the period needs one.
    pub fn interval(&self) -> Option<&'static str> {
        match self {
            Period::Daily | Period::Weekly => Some("hourly"),
            Period::Monthly | Period::ThreeMonths | Period::SixMonths | Period::Yearly => {
                Some("daily")
            }
            Period::Max => None,
        }
    }
}

/// A USD-denominated figure inside a per-currency map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsdValue {
    #[serde(default)]
    pub usd: Option<Decimal>,
}

/// `/coins/{id}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinDetails {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub market_data: MarketData,
    /// Platform name to token contract address, in upstream order. Values
    /// may be empty or null.
    #[serde(default)]
    pub platforms: Map<String, Value>,
    #[serde(default)]
    pub tickers: Vec<ExchangeTicker>,
}

impl CoinDetails {
    /// First platform with a usable contract address.
    ///
    /// Upstream lists the coin's primary chain first, so document order is
    /// kept rather than sorting by name.
    pub fn primary_platform(&self) -> Option<(&str, &str)> {
        self.platforms.iter().find_map(|(name, address)| match address.as_str() {
            Some(addr) if !name.is_empty() && !addr.is_empty() => Some((name.as_str(), addr)),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketData {
    #[serde(default)]
    pub current_price: UsdValue,
    #[serde(default)]
    pub price_change_percentage_24h: Option<Decimal>,
    #[serde(default)]
    pub market_cap: UsdValue,
    #[serde(default)]
    pub total_volume: UsdValue,
}

/// A centralized-exchange ticker listed on the coin page.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeTicker {
    #[serde(default)]
    pub converted_last: UsdValue,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub converted_volume: UsdValue,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ExchangeTicker {
    /// Approximates a trade from the ticker's last price. Side is always buy.
    pub fn to_trade(&self) -> Trade {
        Trade {
            price: self.converted_last.usd.unwrap_or_default(),
            value: self.converted_volume.usd.unwrap_or_default(),
            timestamp: self
                .timestamp
                .as_deref()
                .and_then(|ts| parse_timestamp_ms(ts).ok())
                .unwrap_or_default(),
            side: TradeSide::Buy,
            amount: self.volume.unwrap_or_default(),
        }
    }
}

/// Generic `{ "data": ... }` envelope of the on-chain endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OnchainEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolEntry {
    pub id: String,
    pub attributes: PoolAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolAttributes {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnchainTradeEntry {
    pub id: String,
    pub attributes: OnchainTradeAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OnchainTradeAttributes {
    pub price_from_in_usd: String,
    pub kind: String,
    pub block_timestamp: String,
    pub volume_in_usd: String,
    #[serde(default)]
    pub converted_volume: Option<String>,
}

impl TryFrom<&OnchainTradeEntry> for Trade {
    type Error = CoinscopeError;

    fn try_from(entry: &OnchainTradeEntry) -> Result<Self> {
        let attrs = &entry.attributes;
        Ok(Trade {
            price: parse_decimal(&attrs.price_from_in_usd)?,
            value: attrs
                .converted_volume
                .as_deref()
                .map(parse_decimal)
                .transpose()?
                .unwrap_or_default(),
            timestamp: parse_timestamp_ms(&attrs.block_timestamp)?,
            side: if attrs.kind == "buy" {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            amount: parse_decimal(&attrs.volume_in_usd)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvData {
    pub attributes: OhlcvAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OhlcvAttributes {
    /// Newest first, `[timestamp, open, high, low, close, volume]`.
    pub ohlcv_list: Vec<Value>,
}

/// `/search/trending` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendingResponse {
    pub coins: Vec<TrendingCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingCoin {
    pub item: TrendingItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingItem {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub large: Option<String>,
    #[serde(default)]
    pub data: Option<TrendingData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingData {
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub price_change_percentage_24h: HashMap<String, Decimal>,
}

/// An entry of `/coins/categories`.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub market_cap_change_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub top_3_coins: Vec<String>,
}

/// `/search` response, coins section only.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub coins: Vec<SearchCoin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchCoin {
    pub id: String,
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub large: Option<String>,
}

/// Error body returned by the REST API on failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| CoinscopeError::MalformedMessage(format!("invalid decimal {raw}: {e}")))
}

/// Parses an RFC 3339 timestamp into epoch milliseconds.
fn parse_timestamp_ms(raw: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| CoinscopeError::MalformedMessage(format!("invalid timestamp {raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn onchain_trade_converts() {
        let entry: OnchainTradeEntry = serde_json::from_value(json!({
            "id": "eth_123",
            "attributes": {
                "price_from_in_usd": "0.00001234",
                "kind": "sell",
                "block_timestamp": "2024-03-01T12:00:00Z",
                "volume_in_usd": "150.5",
                "converted_volume": "12160000"
            }
        }))
        .unwrap();

        let trade = Trade::try_from(&entry).unwrap();
        assert_eq!(trade.price, dec!(0.00001234));
        assert_eq!(trade.side, TradeSide::Sell);
        assert_eq!(trade.timestamp, 1_709_294_400_000);
        assert_eq!(trade.amount, dec!(150.5));
        assert_eq!(trade.value, dec!(12160000));
    }

    #[test]
    fn primary_platform_skips_blank_entries() {
        let coin: CoinDetails = serde_json::from_value(json!({
            "id": "usd-coin",
            "market_data": {},
            "platforms": {
                "": "",
                "solana": null,
                "ethereum": "0xa0b8",
                "base": "0x8335"
            }
        }))
        .unwrap();

        assert_eq!(coin.primary_platform(), Some(("ethereum", "0xa0b8")));
    }

    #[test]
    fn primary_platform_keeps_upstream_order() {
        let coin: CoinDetails = serde_json::from_str(
            r#"{
                "id": "usd-coin",
                "market_data": {},
                "platforms": {
                    "ethereum": "0xa0b8",
                    "algorand": "31566704",
                    "arbitrum-one": "0xaf88"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(coin.primary_platform(), Some(("ethereum", "0xa0b8")));
    }

    #[test]
    fn native_coin_has_no_platform() {
        let coin: CoinDetails = serde_json::from_value(json!({
            "id": "bitcoin",
            "market_data": { "current_price": { "usd": 64000.5 } },
            "platforms": { "": "" }
        }))
        .unwrap();

        assert!(coin.primary_platform().is_none());
        assert_eq!(coin.market_data.current_price.usd, Some(dec!(64000.5)));
    }

    #[test]
    fn period_query_values() {
        assert_eq!(Period::Daily.days(), "1");
        assert_eq!(Period::Max.days(), "max");
        assert_eq!(Period::Max.interval(), None);
        assert_eq!(Period::Yearly.interval(), Some("daily"));
    }
}
