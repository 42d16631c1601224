//! Snapshot polling for coins without a push feed.
//!
//! Every cycle fetches the coin page, then either the on-chain pool trades
//! and candle (tokens with a contract platform) or the plain OHLC endpoint
//! plus exchange tickers (native coins). At most one cycle is in flight: a
//! tick that fires before the previous cycle finished drops it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::GeckoConfig;
use crate::event::MarketEvent;
use crate::models::gecko::{CoinDetails, ExchangeTicker};
use crate::models::{Candle, LiveInterval, PriceSnapshot, Trade};
use crate::rest::GeckoClient;
use crate::Result;

/// Trades kept from one poll.
const POLL_TRADE_LIMIT: usize = 10;

/// Days of OHLC fetched for native coins.
const NATIVE_OHLC_DAYS: &str = "1";

/// Data gathered by one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot {
    pub price: PriceSnapshot,
    /// Newest first.
    pub trades: Vec<Trade>,
    pub candle: Option<Candle>,
}

/// Maps a coin platform name to the on-chain network identifier.
pub fn network_for_platform(platform: &str) -> &str {
    match platform {
        "ethereum" => "eth",
        "binance-smart-chain" => "bsc",
        "polygon-pos" => "polygon_pos",
        "base" => "base",
        "arbitrum-one" => "arbitrum",
        other => other,
    }
}

/// Periodic snapshot poller for one coin.
pub struct PollingFallback {
    client: GeckoClient,
    coin_id: String,
    interval: LiveInterval,
    period: Duration,
    tx: mpsc::UnboundedSender<MarketEvent>,
}

impl PollingFallback {
    /// The poller never serves cached responses, since its period is
    /// shorter than the cache lifetime.
    #[must_use]
    pub fn new(
        client: &GeckoClient,
        config: &GeckoConfig,
        coin_id: impl Into<String>,
        interval: LiveInterval,
        tx: mpsc::UnboundedSender<MarketEvent>,
    ) -> Self {
        Self {
            client: client.uncached(),
            coin_id: coin_id.into(),
            interval,
            period: config.poll_interval,
            tx,
        }
    }

    /// Polls until `cancel` fires or the consumer drops its receiver.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        info!(coin_id = %self.coin_id, period_secs = self.period.as_secs(), "Polling started");

        loop {
            let cycle = poll_once(&self.client, &self.coin_id, self.interval);
            tokio::pin!(cycle);

            // cancellation wins over a cycle that finished at the same time
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    debug!(coin_id = %self.coin_id, "Poll still in flight, restarting");
                    continue;
                }
                result = &mut cycle => {
                    let event = match result {
                        Ok(snapshot) => MarketEvent::Poll(snapshot),
                        Err(e) => {
                            error!(coin_id = %self.coin_id, "Polling error: {e}");
                            MarketEvent::PollFailed(e.to_string())
                        }
                    };
                    if self.tx.send(event).is_err() {
                        break;
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
        }

        info!(coin_id = %self.coin_id, "Polling stopped");
    }
}

/// Runs a single poll cycle.
///
/// # Errors
///
/// Returns the first request or decoding error of the cycle.
pub async fn poll_once(client: &GeckoClient, coin_id: &str, interval: LiveInterval) -> Result<PollSnapshot> {
    let coin = client.coin(coin_id).await?;
    let price = price_from_coin(&coin);

    let Some((platform, address)) = coin.primary_platform() else {
        return poll_native(client, &coin, price).await;
    };

    let network = network_for_platform(platform);
    let pools = client.token_pools(network, address).await?;
    let Some(pool) = pools.first() else {
        debug!(coin_id, network, "Token has no pools");
        return Ok(PollSnapshot {
            price,
            trades: Vec::new(),
            candle: None,
        });
    };

    let pool_address = &pool.attributes.address;
    let (timeframe, aggregate) = interval.granularity();
    let (trades, ohlcv) = tokio::try_join!(
        client.pool_trades(network, pool_address),
        client.pool_ohlcv(network, pool_address, timeframe, aggregate),
    )?;

    let trades = trades
        .iter()
        .take(POLL_TRADE_LIMIT)
        .map(Trade::try_from)
        .collect::<Result<Vec<_>>>()?;
    let candle = ohlcv
        .attributes
        .ohlcv_list
        .first()
        .map(Candle::from_tuple)
        .transpose()?;

    Ok(PollSnapshot {
        price,
        trades,
        candle,
    })
}

/// Coins without a contract: latest exchange OHLC candle and ticker trades.
async fn poll_native(client: &GeckoClient, coin: &CoinDetails, price: PriceSnapshot) -> Result<PollSnapshot> {
    let candles = client.ohlc_days(&coin.id, NATIVE_OHLC_DAYS, None).await?;
    let trades = coin
        .tickers
        .iter()
        .take(POLL_TRADE_LIMIT)
        .map(ExchangeTicker::to_trade)
        .collect();

    Ok(PollSnapshot {
        price,
        trades,
        candle: candles.last().copied(),
    })
}

fn price_from_coin(coin: &CoinDetails) -> PriceSnapshot {
    let market = &coin.market_data;
    PriceSnapshot {
        price: market.current_price.usd.unwrap_or_default(),
        change_24h: market.price_change_percentage_24h,
        market_cap: market.market_cap.usd,
        volume_24h: market.total_volume.usd,
        coin_id: Some(coin.id.clone()),
        timestamp: None,
    }
}
