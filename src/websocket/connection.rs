//! WebSocket connection lifecycle management.
//!
//! [`MarketStream`] handles connecting, answering keepalive pings, reading
//! frames into its [`Session`], automatic reconnection with exponential
//! backoff, and re-subscription to the current target after each reconnect.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;

use super::handler::{HistorySnapshot, Routed, Session};
use super::{WsReader, WsWriter, connect, send_command, send_commands};
use crate::config::{GeckoConfig, ReconnectPolicy};
use crate::event::{ConnectionState, MarketEvent};
use crate::models::{ChannelTarget, OutboundCommand};
use crate::reconcile::ChartMode;

/// Commands sent from the consumer to the connection manager.
#[derive(Debug, Clone)]
pub enum ConnectionCommand {
    /// Follow a new coin/pool/interval.
    Retarget(ChannelTarget),
    /// A historical series finished loading.
    History(HistorySnapshot),
}

/// Why the reader loop exited.
#[derive(Debug, PartialEq, Eq)]
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// The consumer went away.
    Shutdown,
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
    next: Duration,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            next: policy.initial_backoff,
        }
    }

    /// Returns the next attempt number and delay, or `None` once the
    /// policy's attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if let Some(max) = self.policy.max_attempts
            && self.attempt >= max
        {
            return None;
        }

        self.attempt += 1;
        let delay = self.next;
        self.next = (self.next * 2).min(self.policy.max_backoff);
        Some((self.attempt, delay))
    }

    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.next = self.policy.initial_backoff;
    }
}

/// Manages one feed connection for one consumer.
pub struct MarketStream {
    url: String,
    policy: ReconnectPolicy,
    confirm_timeout: Duration,
    tx: mpsc::UnboundedSender<MarketEvent>,
    cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ready: watch::Sender<bool>,
    session: Session,
}

/// Consumer side of a spawned [`MarketStream`].
pub struct MarketStreamHandle {
    pub events: mpsc::UnboundedReceiver<MarketEvent>,
    pub ready: watch::Receiver<bool>,
    commands: mpsc::UnboundedSender<ConnectionCommand>,
    task: JoinHandle<()>,
}

impl MarketStreamHandle {
    /// Asks the stream to follow `target`. Returns `false` if the stream ended.
    pub fn retarget(&self, target: ChannelTarget) -> bool {
        self.commands
            .send(ConnectionCommand::Retarget(target))
            .is_ok()
    }

    /// Hands a fetched historical series to the stream.
    pub fn load_history(&self, snapshot: HistorySnapshot) -> bool {
        self.commands
            .send(ConnectionCommand::History(snapshot))
            .is_ok()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Unsubscribes, closes the connection and waits for the task to end.
    pub async fn shutdown(self) {
        let MarketStreamHandle { task, commands, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            error!("Market stream task failed: {e}");
        }
    }
}

impl MarketStream {
    /// Creates a new connection manager.
    #[must_use]
    pub fn new(
        config: &GeckoConfig,
        mode: ChartMode,
        tx: mpsc::UnboundedSender<MarketEvent>,
        cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            url: config.stream_url(),
            policy: config.reconnect,
            confirm_timeout: config.confirm_timeout,
            tx,
            cmd_rx,
            ready,
            session: Session::new(config.confirm_timeout, mode),
        }
    }

    /// Spawns a stream following `target` on the current tokio runtime.
    pub fn spawn(config: &GeckoConfig, mode: ChartMode, target: ChannelTarget) -> MarketStreamHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let stream = MarketStream::new(config, mode, tx, cmd_rx);
        let ready = stream.readiness();

        // the receiver is alive, so this cannot fail
        let _ = commands.send(ConnectionCommand::Retarget(target));
        let task = tokio::spawn(stream.run());

        MarketStreamHandle {
            events,
            ready,
            commands,
            task,
        }
    }

    /// Subscribes to readiness flips of the transport.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Runs the connection manager until the consumer goes away or the
    /// reconnect budget is spent.
    pub async fn run(mut self) {
        let mut backoff = Backoff::new(self.policy);

        loop {
            if !self.set_state(ConnectionState::Connecting) {
                return;
            }

            info!("Connecting to WebSocket");
            let (mut write, read) = match connect(&self.url).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Connection failed: {e}");
                    if self.wait_before_retry(&mut backoff).await {
                        continue;
                    }
                    return;
                }
            };

            backoff.reset();
            self.ready.send_replace(true);
            self.set_state(ConnectionState::Open);

            let commands = self.session.on_open(Instant::now());
            let reason = match send_commands(&mut write, &commands).await {
                Ok(()) => {
                    info!("WebSocket connected and subscribed");
                    self.read_loop(&mut write, read).await
                }
                Err(e) => {
                    warn!("Subscribing failed: {e}");
                    DisconnectReason::ConnectionError
                }
            };

            self.ready.send_replace(false);

            match reason {
                DisconnectReason::Shutdown => {
                    self.teardown(&mut write).await;
                    self.set_state(ConnectionState::ClosedFinal);
                    info!("Market stream shutting down");
                    return;
                }
                DisconnectReason::ConnectionError => {
                    self.session.on_close();
                    if !self.wait_before_retry(&mut backoff).await {
                        return;
                    }
                }
            }
        }
    }

    /// Reads frames until disconnection or shutdown.
    async fn read_loop(&mut self, write: &mut WsWriter, mut read: WsReader) -> DisconnectReason {
        let mut resend = tokio::time::interval(self.confirm_timeout);
        resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        resend.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            match self.session.handle_text(&text) {
                                Ok(routed) => {
                                    if let Some(reason) = self.dispatch(write, routed).await {
                                        return reason;
                                    }
                                }
                                Err(e) => warn!("Dropping frame: {e}"),
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            warn!(?frame, "Server closed the connection");
                            return DisconnectReason::ConnectionError;
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return DisconnectReason::Shutdown;
                    };
                    let Some(commands) = self.apply_command(cmd) else {
                        return DisconnectReason::Shutdown;
                    };
                    if let Err(e) = send_commands(write, &commands).await {
                        warn!("Sending subscription commands failed: {e}");
                        return DisconnectReason::ConnectionError;
                    }
                }

                _ = resend.tick() => {
                    let commands = self.session.resend_unconfirmed(Instant::now());
                    if let Err(e) = send_commands(write, &commands).await {
                        warn!("Resending subscriptions failed: {e}");
                        return DisconnectReason::ConnectionError;
                    }
                }
            }
        }
    }

    /// Acts on a routed frame. Returns a reason if the loop must exit.
    async fn dispatch(&mut self, write: &mut WsWriter, routed: Routed) -> Option<DisconnectReason> {
        let event = match routed {
            Routed::Reply(command) => {
                if let Err(e) = send_command(write, &command).await {
                    warn!("Keepalive reply failed: {e}");
                    return Some(DisconnectReason::ConnectionError);
                }
                return None;
            }
            Routed::Confirmed(_) | Routed::Ignored => return None,
            Routed::Price(price) => MarketEvent::Price(price),
            Routed::Trades(trades) => MarketEvent::Trades(trades),
            Routed::Series(update) => MarketEvent::Series(update),
        };

        if self.emit(event) {
            None
        } else {
            Some(DisconnectReason::Shutdown)
        }
    }

    /// Applies a consumer command to the session.
    ///
    /// Returns the commands to send, or `None` if the consumer is gone.
    fn apply_command(&mut self, cmd: ConnectionCommand) -> Option<Vec<OutboundCommand>> {
        match cmd {
            ConnectionCommand::Retarget(target) => {
                match self.session.retarget(target, Instant::now()) {
                    Some(commands) => self.emit(MarketEvent::Cleared).then_some(commands),
                    None => Some(Vec::new()),
                }
            }
            ConnectionCommand::History(snapshot) => match self.session.load_history(snapshot) {
                Some(update) => self.emit(MarketEvent::Series(update)).then(Vec::new),
                None => Some(Vec::new()),
            },
        }
    }

    /// Sleeps for the next backoff delay while still accepting commands.
    ///
    /// Returns `false` if the stream should stop.
    async fn wait_before_retry(&mut self, backoff: &mut Backoff) -> bool {
        let Some((attempt, delay)) = backoff.next_delay() else {
            warn!("Reconnect attempts exhausted");
            self.set_state(ConnectionState::ClosedFinal);
            return false;
        };

        info!(attempt, backoff_secs = delay.as_secs(), "Backing off before retry");
        if !self.set_state(ConnectionState::ClosedRetrying { attempt, delay }) {
            return false;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("Market stream shutting down");
                        self.set_state(ConnectionState::ClosedFinal);
                        return false;
                    };
                    // not ready, so the session only records the change
                    if self.apply_command(cmd).is_none() {
                        return false;
                    }
                }
            }
        }
    }

    /// Unsubscribes everything and closes the socket. Errors are logged only.
    async fn teardown(&mut self, write: &mut WsWriter) {
        let unsubscribes: Vec<OutboundCommand> = self
            .session
            .subscriptions()
            .confirmed()
            .chain(self.session.subscriptions().pending())
            .map(OutboundCommand::Unsubscribe)
            .collect();
        self.session.on_close();

        if let Err(e) = send_commands(write, &unsubscribes).await {
            debug!("Unsubscribe on teardown failed: {e}");
        }
        if let Err(e) = write.close().await {
            debug!("Closing WebSocket failed: {e}");
        }
    }

    fn set_state(&self, state: ConnectionState) -> bool {
        debug!(%state, "Connection state");
        self.emit(MarketEvent::Connection(state))
    }

    /// Returns `false` once the consumer dropped its receiver.
    fn emit(&self, event: MarketEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
