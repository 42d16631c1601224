//! Async WebSocket client for the market-data push feed.
//!
//! This module is organized by concern:
//! - [`message`] - Inbound frame decoding
//! - [`subscription`] - Subscription set bookkeeping
//! - [`handler`] - Routing frames into market state
//! - [`connection`] - Connection lifecycle and reconnection

pub mod connection;
pub mod handler;
pub mod message;
pub mod subscription;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;
use crate::models::OutboundCommand;

pub use connection::{ConnectionCommand, MarketStream, MarketStreamHandle};
pub use handler::{HistorySnapshot, MarketState, Routed, Session};
pub use message::{InboundMessage, decode_frame};
pub use subscription::SubscriptionManager;

/// Write half of a feed connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a feed connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`CoinscopeError`](crate::CoinscopeError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Serializes and sends one command.
///
/// # Errors
///
/// Returns a [`CoinscopeError`](crate::CoinscopeError) if serialization or sending fails.
pub async fn send_command(write: &mut WsWriter, command: &OutboundCommand) -> Result<()> {
    let json = command.to_json()?;
    debug!("Sending command: {}", json);
    write.send(Message::Text(json.into())).await?;

    Ok(())
}

/// Sends `commands` in order, stopping at the first failure.
///
/// # Errors
///
/// See [`send_command`].
pub async fn send_commands(write: &mut WsWriter, commands: &[OutboundCommand]) -> Result<()> {
    for command in commands {
        send_command(write, command).await?;
    }

    Ok(())
}
