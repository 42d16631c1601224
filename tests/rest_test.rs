//! REST client tests against a local HTTP stub.

mod common;

use std::time::Duration;

use serde_json::{Value, json};
use tokio_test::assert_ok;

use coinscope::CoinscopeError;
use coinscope::rest::GeckoClient;

use common::HttpStub;

#[tokio::test]
async fn test_error_body_message_is_reported() {
    let stub = HttpStub::spawn(|_| Some((429, r#"{"error":"rate limited"}"#.to_string()))).await;
    let client = assert_ok!(GeckoClient::new(&stub.config()));

    let err = client.fetch::<Value>("/search/trending", &[]).await.unwrap_err();

    match err {
        CoinscopeError::Api { status, message } => {
            assert_eq!(status, 429);
            assert_eq!(message, "rate limited");
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_without_body_uses_status_reason() {
    let stub = HttpStub::spawn(|_| Some((503, "upstream down".to_string()))).await;
    let client = assert_ok!(GeckoClient::new(&stub.config()));

    let err = client.coin("bitcoin").await.unwrap_err();

    assert_eq!(err.to_string(), "API Error: 503: Service Unavailable");
}

#[tokio::test]
async fn test_responses_are_cached_per_url() {
    let stub = HttpStub::spawn(|_| Some((200, json!({"gecko_says": "(V3) To the Moon!"}).to_string()))).await;
    let client = assert_ok!(GeckoClient::new(&stub.config()));

    let first: Value = assert_ok!(client.fetch("/ping", &[]).await);
    let second: Value = assert_ok!(client.fetch("/ping", &[]).await);
    assert_eq!(first, second);
    assert_eq!(stub.requests(), 1);

    let _: Value = assert_ok!(client.fetch("/ping", &[("page", "2")]).await);
    assert_eq!(stub.requests(), 2);

    let _: Value = assert_ok!(client.uncached().fetch("/ping", &[]).await);
    let _: Value = assert_ok!(client.fetch_with_ttl("/ping", &[], Duration::ZERO).await);
    assert_eq!(stub.requests(), 4);
}

#[tokio::test]
async fn test_empty_params_are_left_out() {
    let stub = HttpStub::spawn(|_| Some((200, "[[1700000000000, 1, 2, 0.5, 1.5]]".to_string()))).await;
    let client = assert_ok!(GeckoClient::new(&stub.config()));

    let candles = assert_ok!(client.ohlc_days("bitcoin", "1", None).await);

    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].time, 1_700_000_000);
    assert_eq!(
        stub.paths(),
        vec!["/coins/bitcoin/ohlc?vs_currency=usd&days=1&precision=full".to_string()]
    );
}
