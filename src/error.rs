//! Crate-level error types.
//!
//! [`CoinscopeError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, payload validation) behind a single enum so callers can match
//! on the variant they care about while still using the `?` operator.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoinscopeError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum CoinscopeError {
    /// Configuration values were missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP request itself failed (connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST API answered with a non-2xx status.
    #[error("API Error: {status}: {message}")]
    Api { status: u16, message: String },

    /// A push frame or REST payload did not have the expected shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A candle series failed shape validation.
    #[error("invalid candle series: {0}")]
    InvalidSeries(String),
}
