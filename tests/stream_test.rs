//! End-to-end tests of the market stream against a local WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tungstenite::Message;

use coinscope::config::{GeckoConfig, ReconnectPolicy};
use coinscope::event::{ConnectionState, MarketEvent};
use coinscope::models::{ChannelTarget, LiveInterval};
use coinscope::reconcile::ChartMode;
use coinscope::websocket::{MarketStream, MarketStreamHandle};

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, GeckoConfig) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("listener has an address");
    let config = GeckoConfig {
        websocket_url: format!("ws://{addr}"),
        reconnect: ReconnectPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            max_attempts: Some(3),
        },
        ..GeckoConfig::default()
    };
    (listener, config)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.expect("Failed to accept");
    accept_async(tcp).await.expect("Failed WebSocket handshake")
}

async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = ws
            .next()
            .await
            .expect("client closed early")
            .expect("Failed to read frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("client sent invalid JSON");
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, text: &str) {
    ws.send(Message::Text(text.to_string().into()))
        .await
        .expect("Failed to send frame");
}

async fn next_event(handle: &mut MarketStreamHandle) -> MarketEvent {
    timeout(WAIT, handle.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
}

#[tokio::test]
async fn test_subscribes_answers_ping_and_routes_price() {
    let (listener, config) = bind().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let mut received = vec![next_json(&mut ws).await, next_json(&mut ws).await];

        send(&mut ws, r#"{"type":"ping"}"#).await;
        received.push(next_json(&mut ws).await);

        send(
            &mut ws,
            r#"{"type":"confirm_subscription","identifier":"{\"channel\":\"CGSimplePrice\"}"}"#,
        )
        .await;
        send(&mut ws, r#"{"c":"C1","i":"bitcoin","p":64000.5,"pp":2.1}"#).await;

        // unsubscribe on shutdown, then close
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    received.push(serde_json::from_str(text.as_str()).expect("invalid JSON"));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        received
    });

    let mut handle = MarketStream::spawn(
        &config,
        ChartMode::Live,
        ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute),
    );

    assert_eq!(
        next_event(&mut handle).await,
        MarketEvent::Connection(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut handle).await,
        MarketEvent::Connection(ConnectionState::Open)
    );
    assert!(handle.is_ready());
    assert_eq!(next_event(&mut handle).await, MarketEvent::Cleared);

    let MarketEvent::Price(price) = next_event(&mut handle).await else {
        panic!("expected price event");
    };
    assert_eq!(price.price, dec!(64000.5));
    assert_eq!(price.change_24h, Some(dec!(2.1)));

    timeout(WAIT, handle.shutdown())
        .await
        .expect("shutdown timed out");
    let received = timeout(WAIT, server)
        .await
        .expect("server timed out")
        .expect("server task panicked");

    assert_eq!(received[0]["command"], "subscribe");
    assert_eq!(received[0]["identifier"], r#"{"channel":"CGSimplePrice"}"#);
    assert_eq!(received[1]["command"], "message");
    assert_eq!(received[2]["type"], "pong");
    assert_eq!(received.len(), 4);
    assert_eq!(received[3]["command"], "unsubscribe");
}

#[tokio::test]
async fn test_reconnects_and_resubscribes() {
    let (listener, config) = bind().await;

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        let first_subscribe = next_json(&mut first).await;
        next_json(&mut first).await;
        drop(first);

        let mut second = accept(&listener).await;
        let resubscribe = next_json(&mut second).await;
        next_json(&mut second).await;
        (first_subscribe, resubscribe, second)
    });

    let mut handle = MarketStream::spawn(
        &config,
        ChartMode::Live,
        ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute),
    );

    let mut retried = false;
    let mut opens = 0;
    while opens < 2 {
        match next_event(&mut handle).await {
            MarketEvent::Connection(ConnectionState::Open) => opens += 1,
            MarketEvent::Connection(ConnectionState::ClosedRetrying { attempt, .. }) => {
                assert_eq!(attempt, 1);
                retried = true;
            }
            _ => {}
        }
    }
    assert!(retried);

    let (first_subscribe, resubscribe, _second) = timeout(WAIT, server)
        .await
        .expect("server timed out")
        .expect("server task panicked");
    assert_eq!(first_subscribe, resubscribe);
    assert_eq!(resubscribe["command"], "subscribe");

    timeout(WAIT, handle.shutdown())
        .await
        .expect("shutdown timed out");
}

#[tokio::test]
async fn test_gives_up_after_attempt_budget() {
    let (listener, config) = bind().await;
    // nothing listens on the port anymore
    drop(listener);

    let mut handle = MarketStream::spawn(
        &config,
        ChartMode::Historical,
        ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute),
    );

    let mut attempts = Vec::new();
    loop {
        match next_event(&mut handle).await {
            MarketEvent::Connection(ConnectionState::ClosedRetrying { attempt, .. }) => {
                attempts.push(attempt);
            }
            MarketEvent::Connection(ConnectionState::ClosedFinal) => break,
            _ => {}
        }
    }
    assert_eq!(attempts, vec![1, 2, 3]);
    assert!(!handle.is_ready());
}
