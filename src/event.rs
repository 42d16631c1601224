//! Events delivered to the consumer of a market-data stream.

use std::fmt;
use std::time::Duration;

use crate::models::{PriceSnapshot, Trade};
use crate::polling::PollSnapshot;
use crate::reconcile::SeriesUpdate;

/// Lifecycle of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Waiting `delay` before reconnect attempt number `attempt`.
    ClosedRetrying { attempt: u32, delay: Duration },
    /// No further reconnects will be attempted.
    ClosedFinal,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Open => f.write_str("open"),
            ConnectionState::ClosedRetrying { attempt, delay } => {
                write!(f, "retrying (attempt {attempt} in {}s)", delay.as_secs())
            }
            ConnectionState::ClosedFinal => f.write_str("closed"),
        }
    }
}

/// Something a chart consumer should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Connection(ConnectionState),
    Price(PriceSnapshot),
    /// The full trade tape, newest first.
    Trades(Vec<Trade>),
    Series(SeriesUpdate),
    /// The target changed; all price, trade and candle state was dropped.
    Cleared,
    Poll(PollSnapshot),
    /// A poll cycle failed; the previous data is still current.
    PollFailed(String),
}
