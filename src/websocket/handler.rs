//! Routing of decoded frames into per-target market state.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::message::{InboundMessage, decode_frame};
use super::subscription::SubscriptionManager;
use crate::Result;
use crate::models::{
    Candle, Channel, ChannelTarget, OutboundCommand, PriceSnapshot, Trade, TradeTape,
};
use crate::reconcile::{ChartMode, SeriesReconciler, SeriesUpdate};

/// A historical candle series fetched for one coin.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub coin_id: String,
    pub candles: Vec<Candle>,
    pub mode: ChartMode,
}

/// What routing a frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Must be written back to the server right away.
    Reply(OutboundCommand),
    Confirmed(Channel),
    Price(PriceSnapshot),
    /// The trade tape after the new trade, newest first.
    Trades(Vec<Trade>),
    Series(SeriesUpdate),
    Ignored,
}

/// Consumer-visible state slices for the current target.
#[derive(Debug, Default)]
pub struct MarketState {
    price: Option<PriceSnapshot>,
    trades: TradeTape,
    series: SeriesReconciler,
}

impl MarketState {
    pub fn price(&self) -> Option<&PriceSnapshot> {
        self.price.as_ref()
    }

    pub fn trades(&self) -> &TradeTape {
        &self.trades
    }

    pub fn live_candle(&self) -> Option<&Candle> {
        self.series.live()
    }

    pub fn series(&self) -> Vec<Candle> {
        self.series.current()
    }

    fn clear(&mut self) {
        self.price = None;
        self.trades.clear();
        self.series.clear();
    }
}

/// Subscription bookkeeping plus state for one consumer lifecycle.
///
/// All methods are synchronous; the caller owns the socket and writes
/// whatever commands they return.
#[derive(Debug)]
pub struct Session {
    subscriptions: SubscriptionManager,
    state: MarketState,
}

impl Session {
    #[must_use]
    pub fn new(confirm_timeout: Duration, mode: ChartMode) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(confirm_timeout),
            state: MarketState {
                series: SeriesReconciler::new(mode),
                ..MarketState::default()
            },
        }
    }

    pub fn state(&self) -> &MarketState {
        &self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Decodes and routes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CoinscopeError::MalformedMessage`](crate::CoinscopeError::MalformedMessage)
    /// if the frame cannot be decoded. State is left untouched in that case.
    pub fn handle_text(&mut self, text: &str) -> Result<Routed> {
        let message = decode_frame(text)?;
        Ok(self.route(message))
    }

    /// Applies a decoded frame to the state slices.
    pub fn route(&mut self, message: InboundMessage) -> Routed {
        match message {
            InboundMessage::Ping => {
                debug!("Received ping");
                Routed::Reply(OutboundCommand::Pong)
            }
            InboundMessage::SubscriptionConfirmed(channel) => {
                match self.subscriptions.confirm(&channel) {
                    Some(confirmed) => Routed::Confirmed(confirmed),
                    None => Routed::Ignored,
                }
            }
            InboundMessage::Price(snapshot) => {
                if !self.is_current_coin(snapshot.coin_id.as_deref()) {
                    debug!(coin_id = ?snapshot.coin_id, "Dropping price for previous target");
                    return Routed::Ignored;
                }
                self.state.price = Some(snapshot.clone());
                Routed::Price(snapshot)
            }
            InboundMessage::Trade(trade) => {
                self.state.trades.push(trade);
                Routed::Trades(self.state.trades.to_vec())
            }
            InboundMessage::Candle(candle) => Routed::Series(self.state.series.apply_live(candle)),
            InboundMessage::Unrecognized => Routed::Ignored,
        }
    }

    /// Switches the session to `target`.
    ///
    /// Returns the unsubscribe/subscribe commands to send, or `None` if the
    /// target is unchanged. On change all state slices are cleared before
    /// returning.
    pub fn retarget(&mut self, target: ChannelTarget, now: Instant) -> Option<Vec<OutboundCommand>> {
        let commands = self.subscriptions.retarget(target, now)?;
        self.state.clear();
        Some(commands)
    }

    /// Installs a historical series if it belongs to the current target.
    pub fn load_history(&mut self, snapshot: HistorySnapshot) -> Option<SeriesUpdate> {
        if !self.is_current_coin(Some(&snapshot.coin_id)) {
            info!(coin_id = %snapshot.coin_id, "Discarding history for previous target");
            return None;
        }
        Some(self.state.series.set_historical(snapshot.candles, snapshot.mode))
    }

    /// The transport opened; returns the subscriptions to (re)issue.
    pub fn on_open(&mut self, now: Instant) -> Vec<OutboundCommand> {
        self.subscriptions.set_ready(true, now)
    }

    /// The transport closed; the subscription set is gone with it.
    pub fn on_close(&mut self) {
        self.subscriptions.set_ready(false, Instant::now());
    }

    pub fn resend_unconfirmed(&mut self, now: Instant) -> Vec<OutboundCommand> {
        self.subscriptions.resend_unconfirmed(now)
    }

    /// Frames without a coin id are attributed to the current target.
    fn is_current_coin(&self, coin_id: Option<&str>) -> bool {
        match (coin_id, self.subscriptions.target()) {
            (Some(id), Some(target)) => id == target.coin_id,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}
