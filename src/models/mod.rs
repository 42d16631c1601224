//! Shared models for the push feed and the REST API.
//!
//! Contains channel definitions, outbound command types and the typed
//! payloads carried by price, trade and candle frames.

pub mod candle;
pub mod gecko;
pub mod price;
pub mod target;
pub mod trade;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use candle::{Candle, decode_series, normalize_timestamp};
pub use price::PriceSnapshot;
pub use target::{ChannelSubscription, ChannelTarget, LiveInterval};
pub use trade::{TRADE_CAPACITY, Trade, TradeSide, TradeTape};

/// Push feed channels this crate subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Coin price ticks (frame code `C1`).
    Price,
    /// Trades for a liquidity pool (frame code `G2`).
    PoolTrades,
    /// OHLCV candles for a liquidity pool (frame code `G3`).
    PoolCandles,
}

impl Channel {
    /// Returns the wire-format channel name expected by the feed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Price => "CGSimplePrice",
            Channel::PoolTrades => "OnchainTrade",
            Channel::PoolCandles => "OnchainOHLCV",
        }
    }

    /// Returns the frame discriminant used by data messages on this channel.
    pub fn code(&self) -> &'static str {
        match self {
            Channel::Price => "C1",
            Channel::PoolTrades => "G2",
            Channel::PoolCandles => "G3",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "CGSimplePrice" => Some(Channel::Price),
            "OnchainTrade" => Some(Channel::PoolTrades),
            "OnchainOHLCV" => Some(Channel::PoolCandles),
            _ => None,
        }
    }
}

/// The JSON object carried, string-encoded, in every `identifier` field.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelIdentifier {
    pub channel: String,
}

impl ChannelIdentifier {
    /// Encodes the identifier string for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::Json`](crate::CoinscopeError::Json) if
    /// serialization fails.
    pub fn encode(channel: Channel) -> crate::Result<String> {
        Ok(serde_json::to_string(&ChannelIdentifier {
            channel: channel.as_str().to_string(),
        })?)
    }
}

/// Verb of an outbound channel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    Message,
}

/// A `subscribe`, `unsubscribe` or `message` command on the wire.
#[derive(Debug, Serialize)]
pub struct CommandRequest {
    pub command: CommandKind,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Reply to a feed-level `ping`.
#[derive(Debug, Serialize)]
pub struct PongRequest {
    #[serde(rename = "type")]
    pub tpe: &'static str,
}

impl PongRequest {
    pub fn new() -> Self {
        Self { tpe: "pong" }
    }
}

impl Default for PongRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// A frame the client needs to send, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    Subscribe(Channel),
    Unsubscribe(Channel),
    /// Selection payload for an already-subscribed channel.
    Message { channel: Channel, data: Value },
    Pong,
}

impl OutboundCommand {
    /// Serializes the command into its JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::Json`](crate::CoinscopeError::Json) if
    /// serialization fails.
    pub fn to_json(&self) -> crate::Result<String> {
        let request = match self {
            OutboundCommand::Pong => return Ok(serde_json::to_string(&PongRequest::new())?),
            OutboundCommand::Subscribe(channel) => CommandRequest {
                command: CommandKind::Subscribe,
                identifier: ChannelIdentifier::encode(*channel)?,
                data: None,
            },
            OutboundCommand::Unsubscribe(channel) => CommandRequest {
                command: CommandKind::Unsubscribe,
                identifier: ChannelIdentifier::encode(*channel)?,
                data: None,
            },
            OutboundCommand::Message { channel, data } => CommandRequest {
                command: CommandKind::Message,
                identifier: ChannelIdentifier::encode(*channel)?,
                data: Some(serde_json::to_string(data)?),
            },
        };

        Ok(serde_json::to_string(&request)?)
    }
}
