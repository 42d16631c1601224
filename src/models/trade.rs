//! Trade models and the bounded recent-trades tape.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Number of trades kept on the live tape.
pub const TRADE_CAPACITY: usize = 7;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "b", alias = "buy")]
    Buy,
    #[serde(rename = "s", alias = "sell")]
    Sell,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub price: Decimal,
    /// Quote-currency value of the trade.
    pub value: Decimal,
    /// Epoch milliseconds as reported by the source.
    pub timestamp: i64,
    pub side: TradeSide,
    pub amount: Decimal,
}

/// A `G2` trade frame from the on-chain trade channel.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeUpdate {
    #[serde(rename = "pu", default)]
    pub price: Decimal,
    #[serde(rename = "vo", default)]
    pub value: Decimal,
    #[serde(rename = "t", default)]
    pub timestamp: Option<f64>,
    /// Required: a trade without a direction cannot be placed on the tape,
    /// so such a frame is rejected as malformed rather than defaulted.
    #[serde(rename = "ty")]
    pub side: TradeSide,
    #[serde(rename = "to", default)]
    pub amount: Decimal,
}

impl From<TradeUpdate> for Trade {
    fn from(update: TradeUpdate) -> Self {
        Trade {
            price: update.price,
            value: update.value,
            timestamp: update.timestamp.unwrap_or_default() as i64,
            side: update.side,
            amount: update.amount,
        }
    }
}

/// Most-recent-first list of trades, bounded to [`TRADE_CAPACITY`].
#[derive(Debug, Clone, Default)]
pub struct TradeTape {
    trades: VecDeque<Trade>,
}

impl TradeTape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `trade` at the front, evicting the oldest entry past capacity.
    pub fn push(&mut self, trade: Trade) {
        self.trades.push_front(trade);
        self.trades.truncate(TRADE_CAPACITY);
    }

    pub fn latest(&self) -> Option<&Trade> {
        self.trades.front()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }

    /// Copies the tape out, newest first.
    pub fn to_vec(&self) -> Vec<Trade> {
        self.trades.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(ts: i64) -> Trade {
        Trade {
            price: dec!(1),
            value: dec!(1),
            timestamp: ts,
            side: TradeSide::Buy,
            amount: dec!(1),
        }
    }

    #[test]
    fn tape_is_bounded_and_newest_first() {
        let mut tape = TradeTape::new();
        for ts in 0..20 {
            tape.push(trade(ts));
            assert!(tape.len() <= TRADE_CAPACITY);
            assert_eq!(tape.latest().unwrap().timestamp, ts);
        }
        let trades = tape.to_vec();
        assert_eq!(trades.len(), TRADE_CAPACITY);
        assert_eq!(trades.last().unwrap().timestamp, 13);
    }

    #[test]
    fn update_requires_side_only() {
        let sparse: TradeUpdate = serde_json::from_str(r#"{"ty":"b"}"#).unwrap();
        let trade = Trade::from(sparse);
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.price, Decimal::ZERO);
        assert_eq!(trade.timestamp, 0);

        assert!(serde_json::from_str::<TradeUpdate>(r#"{"pu":1,"vo":2,"t":3,"to":4}"#).is_err());
        assert!(serde_json::from_str::<TradeUpdate>(r#"{"pu":1,"ty":"x"}"#).is_err());
    }

    #[test]
    fn side_accepts_short_and_long_tags() {
        let short: TradeSide = serde_json::from_str("\"s\"").unwrap();
        let long: TradeSide = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(short, TradeSide::Sell);
        assert_eq!(long, TradeSide::Buy);
    }
}
