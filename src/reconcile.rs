//! Merging live candles into a historical series.
//!
//! [`reconcile`] is the pure merge. [`SeriesReconciler`] owns the historical
//! series and the latest live candle for one chart and decides when the
//! viewport should be re-fitted.

use serde::Serialize;
use tracing::debug;

use crate::models::{Candle, normalize_timestamp};

/// How a chart treats incoming data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChartMode {
    /// Every reconciliation re-fits the viewport.
    #[default]
    Historical,
    /// Re-fit only when the number of buckets changes.
    Live,
}

/// The series a chart should render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesUpdate {
    pub candles: Vec<Candle>,
    /// The viewport should be re-fitted to the data.
    pub refit: bool,
}

/// Merges `live` into `historical` and returns a sorted, duplicate-free series.
///
/// A live candle with the same timestamp as the last historical candle
/// replaces it; any other live candle is appended. When several candles
/// share a timestamp after sorting, the one merged last wins. Timestamps are
/// normalized to seconds first.
pub fn reconcile(historical: &[Candle], live: Option<&Candle>) -> Vec<Candle> {
    let mut merged: Vec<Candle> = historical.iter().map(normalized).collect();

    if let Some(live) = live.map(normalized) {
        match merged.last_mut() {
            Some(last) if last.time == live.time => *last = live,
            _ => merged.push(live),
        }
    }

    // stable, so later duplicates stay after earlier ones
    merged.sort_by_key(|candle| candle.time);

    let mut series: Vec<Candle> = Vec::with_capacity(merged.len());
    for candle in merged {
        match series.last_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => series.push(candle),
        }
    }
    series
}

fn normalized(candle: &Candle) -> Candle {
    Candle {
        time: normalize_timestamp(candle.time as f64),
        ..*candle
    }
}

/// Per-chart reconciliation state.
#[derive(Debug, Clone, Default)]
pub struct SeriesReconciler {
    historical: Vec<Candle>,
    live: Option<Candle>,
    mode: ChartMode,
    previous_len: Option<usize>,
}

impl SeriesReconciler {
    pub fn new(mode: ChartMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ChartMode {
        self.mode
    }

    pub fn live(&self) -> Option<&Candle> {
        self.live.as_ref()
    }

    /// Replaces the historical series wholesale, e.g. after a period change.
    pub fn set_historical(&mut self, candles: Vec<Candle>, mode: ChartMode) -> SeriesUpdate {
        debug!(candles = candles.len(), ?mode, "Loaded historical series");
        self.historical = candles;
        self.mode = mode;
        self.render()
    }

    /// Records the newest streamed candle.
    pub fn apply_live(&mut self, candle: Candle) -> SeriesUpdate {
        self.live = Some(candle);
        self.render()
    }

    /// Drops all data, e.g. when the chart switches to another coin.
    pub fn clear(&mut self) {
        self.historical.clear();
        self.live = None;
        self.previous_len = None;
    }

    /// Reconciles the current state without changing it.
    pub fn current(&self) -> Vec<Candle> {
        reconcile(&self.historical, self.live.as_ref())
    }

    fn render(&mut self) -> SeriesUpdate {
        let candles = self.current();
        let changed = self.previous_len != Some(candles.len());
        let refit = changed || self.mode == ChartMode::Historical;
        self.previous_len = Some(candles.len());

        SeriesUpdate { candles, refit }
    }
}
