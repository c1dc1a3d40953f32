//! Backend connection handle and lifecycle.
//!
//! # Responsibilities
//! - Own the write half of the single backend connection
//! - Serialize writes (one writer at a time) under a deadline
//! - Generate unique connection IDs for tracing
//! - Signal the connection's pump to stop, and wait for it

use futures_util::{Sink, SinkExt, Stream};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::bridge::error::TransportError;
use crate::bridge::protocol::Message;

/// Write half of a backend connection, carrying JSON text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Read half of a backend connection. The stream ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The manager's exclusive reference to the active backend connection.
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Mutex<FrameSink>,
    closed: watch::Sender<bool>,
    pump: StdMutex<Option<JoinHandle<()>>>,
    established_at: Instant,
}

impl ConnectionHandle {
    /// Wrap a write half. The receiver observes [`close`](Self::close).
    pub fn new(sink: FrameSink) -> (Self, watch::Receiver<bool>) {
        let (closed, closed_rx) = watch::channel(false);
        let handle = Self {
            id: ConnectionId::new(),
            sink: Mutex::new(sink),
            closed,
            pump: StdMutex::new(None),
            established_at: Instant::now(),
        };
        (handle, closed_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Time since the connection was attached.
    pub fn age(&self) -> Duration {
        self.established_at.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Serialize and write one message, waiting for the writer slot and the
    /// flush together for at most `deadline`.
    pub async fn send(&self, message: &Message, deadline: Duration) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let text = serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))?;

        tokio::time::timeout(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.send(text).await
        })
        .await
        .map_err(|_| TransportError::WriteDeadline(deadline))?
    }

    /// Bind the pump task reading this connection.
    pub(crate) fn bind_pump(&self, task: JoinHandle<()>) {
        if let Ok(mut pump) = self.pump.lock() {
            *pump = Some(task);
        }
    }

    /// Stop this connection: signal its pump and wait for it to exit.
    ///
    /// Must not be called from the pump itself.
    pub async fn close(&self) {
        self.closed.send_replace(true);
        let task = self.pump.lock().ok().and_then(|mut pump| pump.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(connection_id = %self.id, error = %e, "Pump task ended abnormally");
            }
        }
    }

    /// Close the write half, sending a close frame if the peer is still there.
    pub(crate) async fn shutdown_sink(&self, deadline: Duration) {
        self.closed.send_replace(true);
        let result = tokio::time::timeout(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;
        match result {
            Ok(Ok(())) => tracing::trace!(connection_id = %self.id, "Connection sink closed"),
            Ok(Err(e)) => tracing::trace!(connection_id = %self.id, error = %e, "Connection sink close failed"),
            Err(_) => tracing::debug!(connection_id = %self.id, "Connection sink close timed out"),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
