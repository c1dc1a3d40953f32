//! Shared utilities for integration testing.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};

use query_bridge::config::BridgeConfig;
use query_bridge::http::HttpServer;
use query_bridge::lifecycle::Shutdown;
use query_bridge::ConnectionManager;

pub type PeerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A bridge running on an ephemeral port.
pub struct TestBridge {
    pub addr: SocketAddr,
    pub manager: Arc<ConnectionManager>,
    pub shutdown: Shutdown,
    pub server: tokio::task::JoinHandle<()>,
}

impl TestBridge {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/backend-connect", self.addr)
    }

    /// Connect a peer and wait until the manager has attached it.
    pub async fn connect_peer(&self) -> PeerSocket {
        let before = self.manager.connection_id().await;
        let (socket, _) = tokio_tungstenite::connect_async(self.ws_url())
            .await
            .expect("Bridge unreachable");

        for _ in 0..200 {
            let current = self.manager.connection_id().await;
            if current.is_some() && current != before {
                return socket;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("peer was never attached");
    }

    /// Wait until the manager no longer holds a connection.
    #[allow(dead_code)]
    pub async fn wait_disconnected(&self) {
        for _ in 0..200 {
            if !self.manager.is_connected().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection was never cleared");
    }
}

/// Start a bridge with short deadlines suitable for tests.
pub async fn start_bridge(read_timeout_ms: u64) -> TestBridge {
    let mut config = BridgeConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.timeouts.write_timeout_ms = 500;
    config.timeouts.read_timeout_ms = read_timeout_ms;

    let listener = tokio::net::TcpListener::bind(config.listener.bind_address())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config);
    let manager = server.manager();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let server = tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestBridge { addr, manager, shutdown, server }
}

/// HTTP client without connection pooling or proxies.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read the next query message the bridge sent to this peer.
pub async fn next_query(socket: &mut PeerSocket) -> Value {
    loop {
        match socket.next().await {
            Some(Ok(WsMessage::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("peer connection ended: {:?}", other),
        }
    }
}

/// Send a reply frame from the peer.
pub async fn reply(socket: &mut PeerSocket, echo: &Value, data: Value) {
    let frame = serde_json::json!({ "data": data, "echo": echo });
    socket.send(WsMessage::text(frame.to_string())).await.unwrap();
}

/// Answer every query on this socket with `data` until it closes.
#[allow(dead_code)]
pub fn spawn_answering_peer(mut socket: PeerSocket, data: Value) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(Ok(frame)) = socket.next().await {
            if let WsMessage::Text(text) = frame {
                let message: Value = serde_json::from_str(text.as_str()).unwrap();
                let frame = serde_json::json!({ "data": data, "echo": message["echo"] });
                if socket.send(WsMessage::text(frame.to_string())).await.is_err() {
                    break;
                }
            }
        }
    })
}
