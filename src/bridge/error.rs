//! Bridge error definitions.

use std::time::Duration;
use thiserror::Error;

/// Failures of the raw connection halves.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The write did not complete before its deadline.
    #[error("write deadline of {0:?} exceeded")]
    WriteDeadline(Duration),

    /// The connection is closed or the handle was superseded.
    #[error("connection closed")]
    Closed,

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A binary frame did not carry UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Errors produced by the connection manager.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No backend peer is attached.
    #[error("no active backend connection")]
    NoConnection,

    /// Writing the query to the peer failed.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] TransportError),

    /// No matching reply arrived within the wait budget.
    #[error("timeout waiting for response after {0:?}")]
    Timeout(Duration),

    /// An inbound frame was not a valid reply. Ends the connection.
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] serde_json::Error),

    /// Reading from the peer failed. Ends the connection.
    #[error("connection lost: {0}")]
    Disconnected(#[source] TransportError),
}

impl BridgeError {
    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::NoConnection => "no_connection",
            BridgeError::SendFailed(_) => "send_failed",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::MalformedReply(_) => "malformed_reply",
            BridgeError::Disconnected(_) => "disconnected",
        }
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
