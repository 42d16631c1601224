use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest known price figures for a coin. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSnapshot {
    pub price: Decimal,
    /// 24h change in percent.
    pub change_24h: Option<Decimal>,
    pub market_cap: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub coin_id: Option<String>,
    pub timestamp: Option<i64>,
}

/// A `C1` frame from the simple-price channel.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceUpdate {
    #[serde(rename = "i", default)]
    pub coin_id: Option<String>,
    #[serde(rename = "p", default)]
    pub price: Option<Decimal>,
    #[serde(rename = "pp", default)]
    pub change_24h: Option<Decimal>,
    #[serde(rename = "m", default)]
    pub market_cap: Option<Decimal>,
    #[serde(rename = "v", default)]
    pub volume_24h: Option<Decimal>,
    #[serde(rename = "t", default)]
    pub timestamp: Option<f64>,
}

impl From<PriceUpdate> for PriceSnapshot {
    fn from(update: PriceUpdate) -> Self {
        PriceSnapshot {
            price: update.price.unwrap_or_default(),
            change_24h: update.change_24h,
            market_cap: update.market_cap,
            volume_24h: update.volume_24h,
            coin_id: update.coin_id,
            timestamp: update.timestamp.map(|t| t as i64),
        }
    }
}
