use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use coinscope::config::fetch_config;
use coinscope::event::MarketEvent;
use coinscope::models::gecko::Period;
use coinscope::models::{ChannelTarget, LiveInterval};
use coinscope::polling::PollingFallback;
use coinscope::reconcile::ChartMode;
use coinscope::rest::GeckoClient;
use coinscope::websocket::{HistorySnapshot, MarketStream};
use coinscope::{CoinscopeError, Result};

const USAGE: &str = "usage: coinscope <coin-id> [pool-id] [1s|1m]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    let config = &app_config.gecko;

    let mut args = std::env::args().skip(1);
    let coin_id = args
        .next()
        .ok_or_else(|| CoinscopeError::Config(USAGE.to_string()))?;
    let pool_id = args.next().unwrap_or_default();
    let interval = match args.next() {
        Some(raw) => raw.parse::<LiveInterval>()?,
        None => LiveInterval::default(),
    };

    let client = GeckoClient::new(config)?;

    if config.api_key.is_none() {
        info!(%coin_id, "No API key configured, polling snapshots instead of streaming");
        let (tx, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let poller = PollingFallback::new(&client, config, coin_id, interval, tx);
        let task = tokio::spawn(poller.run(cancel.clone()));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(event) => log_event(&event),
                    None => break,
                },
            }
        }

        cancel.cancel();
        if let Err(e) = task.await {
            error!("Polling task failed: {e}");
        }
        return Ok(());
    }

    let target = ChannelTarget::new(coin_id.clone(), pool_id, interval);
    let mut stream = MarketStream::spawn(config, ChartMode::Live, target);

    match client.ohlc(&coin_id, Period::Daily).await {
        Ok(candles) => {
            stream.load_history(HistorySnapshot {
                coin_id,
                candles,
                mode: ChartMode::Live,
            });
        }
        Err(e) => warn!("Loading history failed, charting live candles only: {e}"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = stream.events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }

    stream.shutdown().await;
    Ok(())
}

fn log_event(event: &MarketEvent) {
    match event {
        MarketEvent::Connection(state) => info!(%state, "Connection"),
        MarketEvent::Price(price) => info!(price = %price.price, change_24h = ?price.change_24h, "Price"),
        MarketEvent::Trades(trades) => {
            if let Some(latest) = trades.first() {
                info!(count = trades.len(), price = %latest.price, side = ?latest.side, "Trade");
            }
        }
        MarketEvent::Series(update) => {
            if let Some(last) = update.candles.last() {
                info!(
                    candles = update.candles.len(),
                    refit = update.refit,
                    time = last.time,
                    close = %last.close,
                    "Series"
                );
            }
        }
        MarketEvent::Cleared => info!("Target changed, state cleared"),
        MarketEvent::Poll(snapshot) => info!(
            price = %snapshot.price.price,
            trades = snapshot.trades.len(),
            close = ?snapshot.candle.map(|c| c.close),
            "Poll"
        ),
        MarketEvent::PollFailed(message) => warn!(%message, "Poll failed"),
    }
}
