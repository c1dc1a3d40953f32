//! WebSocket upgrade handling for the backend peer.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the peer
//! - Adapt the socket into the manager's text sink/stream halves
//! - Hand the new connection to the manager (superseding any old one)
//!
//! # Data Flow
//! ```text
//! Peer ──upgrade──▶ upgrade_handler ──split──▶ ConnectionManager::attach
//! ```
//!
//! # Design Decisions
//! - Text frames carry JSON; binary frames are accepted if they are UTF-8
//! - Ping/pong are answered by the WebSocket layer and skipped here
//! - A close frame ends the connection like a dropped socket does

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{future, SinkExt, StreamExt};
use std::net::SocketAddr;

use crate::bridge::{FrameSink, FrameStream, TransportError};
use crate::http::server::AppState;

/// Accept the backend peer's connection.
pub async fn upgrade_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(peer_addr = %addr, "Backend upgrade requested");

    ws.on_failed_upgrade(move |e| {
        tracing::warn!(peer_addr = %addr, error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        let (sink, stream) = split_socket(socket);
        let id = state.manager.attach(sink, stream).await;
        tracing::info!(peer_addr = %addr, connection_id = %id, "Backend peer attached");
    })
}

/// Split an upgraded socket into the halves the manager works with.
pub fn split_socket(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();

    let sink: FrameSink = Box::pin(
        sink.sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into())))),
    );
    let stream: FrameStream = Box::pin(stream.filter_map(|frame| future::ready(decode_frame(frame))));

    (sink, stream)
}

fn decode_frame(frame: Result<Message, axum::Error>) -> Option<Result<String, TransportError>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => Some(
            String::from_utf8(bytes.to_vec()).map_err(|_| TransportError::InvalidUtf8),
        ),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
        Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn text_and_binary_frames_decode() {
        let text = decode_frame(Ok(Message::Text("{\"data\":1}".into())));
        assert_eq!(text.unwrap().unwrap(), "{\"data\":1}");

        let binary = decode_frame(Ok(Message::Binary(Bytes::from_static(b"{}"))));
        assert_eq!(binary.unwrap().unwrap(), "{}");
    }

    #[test]
    fn invalid_binary_is_an_error() {
        let frame = decode_frame(Ok(Message::Binary(Bytes::from_static(&[0xff, 0xfe]))));
        assert!(matches!(frame, Some(Err(TransportError::InvalidUtf8))));
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(decode_frame(Ok(Message::Ping(Bytes::new()))).is_none());
        assert!(decode_frame(Ok(Message::Pong(Bytes::new()))).is_none());
    }
}
