//! Realtime market-data client for CoinGecko-style APIs.
//!
//! Provides a reconnecting WebSocket stream that subscribes a chart to a
//! coin's price, pool trades and pool candles, a reconciler that merges live
//! candles into a historical series, a cached REST client, and a polling
//! fallback for consumers without a streaming plan.

pub mod config;
pub mod error;
pub mod event;
pub mod models;
pub mod polling;
pub mod reconcile;
pub mod rest;
pub mod websocket;

pub use error::{CoinscopeError, Result};
