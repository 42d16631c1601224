//! OHLC candlestick models and ingestion-time validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{CoinscopeError, Result};

/// Raw timestamps at or above this value are milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

/// Normalizes an epoch timestamp of ambiguous unit to whole seconds.
///
/// Values `>= 1e11` are treated as milliseconds, anything below as seconds.
/// The result is always floored.
///
/// Normalizing twice is a no-op only for inputs below `1e14`: a larger
/// millisecond value divides down to seconds that are themselves `>= 1e11`.
pub fn normalize_timestamp(raw: f64) -> i64 {
    if raw >= MILLIS_THRESHOLD {
        (raw / 1000.0).floor() as i64
    } else {
        raw.floor() as i64
    }
}

/// A single OHLC bar, timestamped in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candle {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    pub fn new(time: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }

    /// Decodes a `[timestamp, open, high, low, close, ...]` tuple.
    ///
    /// Trailing elements (volume on the on-chain feed) are ignored. The
    /// timestamp is normalized to seconds.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::InvalidSeries`] if the value is not an array
    /// of at least five numeric elements.
    pub fn from_tuple(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| CoinscopeError::InvalidSeries(format!("candle is not an array: {value}")))?;
        if items.len() < 5 {
            return Err(CoinscopeError::InvalidSeries(format!(
                "candle needs 5 elements, got {}",
                items.len()
            )));
        }

        let time = items[0].as_f64().ok_or_else(|| {
            CoinscopeError::InvalidSeries(format!("candle timestamp is not a number: {}", items[0]))
        })?;

        Ok(Self {
            time: normalize_timestamp(time),
            open: price_at(items, 1)?,
            high: price_at(items, 2)?,
            low: price_at(items, 3)?,
            close: price_at(items, 4)?,
        })
    }
}

fn price_at(items: &[Value], index: usize) -> Result<Decimal> {
    let value = &items[index];
    if value.is_array() || value.is_object() {
        return Err(CoinscopeError::InvalidSeries(format!(
            "candle field {index} is not a price: {value}"
        )));
    }
    <Decimal as Deserialize>::deserialize(value).map_err(|e| {
        CoinscopeError::InvalidSeries(format!("candle field {index} is not a price: {e}"))
    })
}

/// Decodes a historical OHLC payload into candles.
///
/// The provider occasionally wraps the candle array in one extra array
/// level; exactly one such level is unwrapped. Deeper nesting is rejected.
///
/// # Errors
///
/// Returns [`CoinscopeError::InvalidSeries`] on unexpected nesting or if any
/// element is not a valid candle tuple.
pub fn decode_series(value: &Value) -> Result<Vec<Candle>> {
    let items: &[Value] = value.as_array().ok_or_else(|| {
        CoinscopeError::InvalidSeries(format!("series is not an array: {}", type_name(value)))
    })?;

    let items = match nesting_depth(items) {
        0 => items,
        1 => {
            warn!("Unwrapping one extra level of candle nesting");
            if items.len() != 1 {
                return Err(CoinscopeError::InvalidSeries(format!(
                    "nested series wrapper holds {} arrays, expected 1",
                    items.len()
                )));
            }
            // nesting_depth guarantees items[0] is an array
            items[0].as_array().map(Vec::as_slice).unwrap_or_default()
        }
        depth => {
            return Err(CoinscopeError::InvalidSeries(format!(
                "series nested {depth} levels too deep"
            )));
        }
    };

    items.iter().map(Candle::from_tuple).collect()
}

/// Counts how many array levels sit above the first candle tuple.
fn nesting_depth(items: &[Value]) -> usize {
    let mut depth = 0;
    let mut current = items.first();
    while let Some(Value::Array(inner)) = current {
        match inner.first() {
            Some(Value::Array(_)) => {
                depth += 1;
                current = inner.first();
            }
            _ => break,
        }
    }
    depth
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A `G3` candle frame from the on-chain OHLCV channel.
#[derive(Debug, Clone, Deserialize)]
pub struct CandleUpdate {
    #[serde(rename = "t", default)]
    pub timestamp: Option<f64>,
    #[serde(rename = "o", default)]
    pub open: Option<Decimal>,
    #[serde(rename = "h", default)]
    pub high: Option<Decimal>,
    #[serde(rename = "l", default)]
    pub low: Option<Decimal>,
    #[serde(rename = "c", default)]
    pub close: Option<Decimal>,
    #[serde(rename = "v", default)]
    pub volume: Option<Decimal>,
}

impl From<CandleUpdate> for Candle {
    /// Missing fields default to zero, matching the feed's partial frames.
    fn from(update: CandleUpdate) -> Self {
        Candle {
            time: normalize_timestamp(update.timestamp.unwrap_or_default()),
            open: update.open.unwrap_or_default(),
            high: update.high.unwrap_or_default(),
            low: update.low.unwrap_or_default(),
            close: update.close.unwrap_or_default(),
        }
    }
}
