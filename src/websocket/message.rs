//! Inbound frame decoding.
//!
//! The feed mixes two discriminants: control frames carry `type`, data
//! frames carry a channel code in `c` (price, trades) or `ch` (candles).
//! Candle frames reuse `c` for the close price, so `ch` is checked first.
//! Everything is decoded once here into [`InboundMessage`].

use serde_json::Value;

use crate::models::candle::CandleUpdate;
use crate::models::price::PriceUpdate;
use crate::models::trade::TradeUpdate;
use crate::models::{Candle, Channel, ChannelIdentifier, PriceSnapshot, Trade};
use crate::{CoinscopeError, Result};

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Ping,
    /// The server accepted a subscribe command for this channel.
    SubscriptionConfirmed(String),
    Price(PriceSnapshot),
    Trade(Trade),
    Candle(Candle),
    /// A frame kind this client does not handle.
    Unrecognized,
}

/// Parses a text frame into an [`InboundMessage`].
///
/// # Errors
///
/// Returns [`CoinscopeError::MalformedMessage`] if the frame is not JSON or a
/// recognized kind is missing required fields.
pub fn decode_frame(text: &str) -> Result<InboundMessage> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| CoinscopeError::MalformedMessage(e.to_string()))?;
    decode_value(value)
}

/// Classifies an already-parsed frame.
///
/// # Errors
///
/// See [`decode_frame`].
pub fn decode_value(value: Value) -> Result<InboundMessage> {
    if let Some(msg_type) = value.get("type").and_then(Value::as_str) {
        return match msg_type {
            "ping" => Ok(InboundMessage::Ping),
            "confirm_subscription" => decode_confirmation(&value),
            _ => Ok(InboundMessage::Unrecognized),
        };
    }

    if value.get("ch").and_then(Value::as_str) == Some(Channel::PoolCandles.code()) {
        let update: CandleUpdate = serde_json::from_value(value).map_err(malformed("candle"))?;
        return Ok(InboundMessage::Candle(update.into()));
    }

    match value.get("c").and_then(Value::as_str) {
        Some(code) if code == Channel::Price.code() => {
            let update: PriceUpdate = serde_json::from_value(value).map_err(malformed("price"))?;
            Ok(InboundMessage::Price(update.into()))
        }
        Some(code) if code == Channel::PoolTrades.code() => {
            let update: TradeUpdate = serde_json::from_value(value).map_err(malformed("trade"))?;
            Ok(InboundMessage::Trade(update.into()))
        }
        _ => Ok(InboundMessage::Unrecognized),
    }
}

fn decode_confirmation(value: &Value) -> Result<InboundMessage> {
    let identifier = value
        .get("identifier")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CoinscopeError::MalformedMessage("confirmation without identifier".to_string())
        })?;
    let identifier: ChannelIdentifier =
        serde_json::from_str(identifier).map_err(malformed("confirmation identifier"))?;

    Ok(InboundMessage::SubscriptionConfirmed(identifier.channel))
}

fn malformed(kind: &'static str) -> impl Fn(serde_json::Error) -> CoinscopeError {
    move |e| CoinscopeError::MalformedMessage(format!("{kind} frame: {e}"))
}
