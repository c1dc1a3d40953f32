//! Connection manager: the single backend connection plus request correlation.
//!
//! # Responsibilities
//! - Hold at most one live backend connection (replace-on-attach)
//! - Issue queries and wait for their matching replies under deadlines
//! - Run one inbound pump per connection, resolving correlation entries
//! - Clear the connection when its pump observes a read failure
//!
//! # Connection states
//! ```text
//! Absent ──attach──▶ Active ──read error / close / superseded──▶ Absent
//! ```

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::bridge::connection::{ConnectionHandle, ConnectionId, FrameSink, FrameStream};
use crate::bridge::error::{BridgeError, BridgeResult, TransportError};
use crate::bridge::protocol::{Message, Payload, Reply};
use crate::bridge::table::{CorrelationTable, Delivery, TableSnapshot};
use crate::config::TimeoutConfig;
use crate::observability::metrics;

/// Deadlines applied by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Maximum time to flush one outbound message.
    pub write: Duration,
    /// Maximum time to wait for a matching reply after the send completes.
    pub read: Duration,
}

impl From<&TimeoutConfig> for Deadlines {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            write: config.write_timeout(),
            read: config.read_timeout(),
        }
    }
}

/// Snapshot of manager state for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub connected: bool,
    pub connection_id: Option<u64>,
    pub connection_age_secs: Option<u64>,
    pub pending: usize,
    pub connections_accepted: u64,
    pub table: TableSnapshot,
}

/// Owns the backend connection and the correlation table.
#[derive(Debug)]
pub struct ConnectionManager {
    active: RwLock<Option<Arc<ConnectionHandle>>>,
    table: CorrelationTable,
    deadlines: Deadlines,
    connections_accepted: AtomicU64,
}

impl ConnectionManager {
    pub fn new(deadlines: Deadlines) -> Self {
        Self {
            active: RwLock::new(None),
            table: CorrelationTable::new(),
            deadlines,
            connections_accepted: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self::new(Deadlines::from(config))
    }

    pub fn deadlines(&self) -> Deadlines {
        self.deadlines
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    /// Send a query to the peer and wait for its reply.
    pub async fn query(&self) -> BridgeResult<Payload> {
        let pending = {
            let active = self.active.read().await;
            let handle = active.as_ref().ok_or(BridgeError::NoConnection)?;

            let pending = self.table.register();
            let message = Message::query(pending.token().clone());
            if let Err(e) = handle.send(&message, self.deadlines.write).await {
                warn!(
                    connection_id = %handle.id(),
                    token = %pending.token(),
                    error = %e,
                    "Failed to send query"
                );
                return Err(BridgeError::SendFailed(e));
            }
            debug!(connection_id = %handle.id(), token = %pending.token(), "Query sent");
            pending
        };
        metrics::set_pending(self.table.len());

        let result = pending.wait(self.deadlines.read).await;
        metrics::set_pending(self.table.len());
        result.map(Reply::into_payload)
    }

    /// Install a new backend connection, superseding any previous one.
    pub async fn attach(self: &Arc<Self>, sink: FrameSink, stream: FrameStream) -> ConnectionId {
        let (handle, closed) = ConnectionHandle::new(sink);
        let handle = Arc::new(handle);
        let id = handle.id();

        // The pump is bound before the handle becomes visible, so whoever
        // supersedes it can always wait for that pump to exit.
        let previous = {
            let mut active = self.active.write().await;
            let task = tokio::spawn(Arc::clone(self).pump(Arc::clone(&handle), stream, closed));
            handle.bind_pump(task);
            self.connections_accepted.fetch_add(1, Ordering::Relaxed);
            info!(connection_id = %id, "Backend connection established");
            metrics::record_connection_event("attached");
            active.replace(Arc::clone(&handle))
        };

        if let Some(previous) = previous {
            info!(
                connection_id = %id,
                superseded = %previous.id(),
                "Replacing backend connection"
            );
            metrics::record_connection_event("superseded");
            previous.close().await;
        }

        id
    }

    /// Drop the active connection, if any. Returns whether one was present.
    pub async fn close(&self) -> bool {
        let previous = self.active.write().await.take();
        match previous {
            Some(handle) => {
                info!(connection_id = %handle.id(), "Closing backend connection");
                metrics::record_connection_event("closed");
                handle.close().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.active.read().await.is_some()
    }

    pub async fn connection_id(&self) -> Option<ConnectionId> {
        self.active.read().await.as_ref().map(|handle| handle.id())
    }

    /// Number of queries waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.table.len()
    }

    pub async fn status(&self) -> ManagerStatus {
        let active = self.active.read().await;
        ManagerStatus {
            connected: active.is_some(),
            connection_id: active.as_ref().map(|handle| handle.id().as_u64()),
            connection_age_secs: active.as_ref().map(|handle| handle.age().as_secs()),
            pending: self.table.len(),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            table: self.table.stats().snapshot(),
        }
    }

    /// Read replies from one connection until it fails or is closed.
    async fn pump(
        self: Arc<Self>,
        handle: Arc<ConnectionHandle>,
        mut stream: FrameStream,
        mut closed: watch::Receiver<bool>,
    ) {
        let id = handle.id();
        debug!(connection_id = %id, "Pump started");

        let outcome = loop {
            let frame = tokio::select! {
                biased;
                _ = closed.changed() => break Ok(()),
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(text)) => match Reply::parse(&text) {
                    Ok(reply) => {
                        if self.table.deliver(reply) == Delivery::Unmatched {
                            metrics::record_unmatched_reply();
                        }
                    }
                    Err(e) => break Err(BridgeError::MalformedReply(e)),
                },
                Some(Err(e)) => break Err(BridgeError::Disconnected(e)),
                None => break Err(BridgeError::Disconnected(TransportError::Closed)),
            }
        };

        match &outcome {
            Ok(()) => debug!(connection_id = %id, "Pump stopped"),
            Err(e) => {
                warn!(connection_id = %id, reason = e.kind(), error = %e, "Backend connection lost");
                metrics::record_connection_event("lost");
            }
        }

        self.detach(id).await;
        handle.shutdown_sink(self.deadlines.write).await;
    }

    /// Clear the slot, but only while it still holds connection `id`.
    async fn detach(&self, id: ConnectionId) {
        let mut active = self.active.write().await;
        if active.as_ref().is_some_and(|handle| handle.id() == id) {
            *active = None;
            debug!(connection_id = %id, "Backend connection cleared");
        }
    }
}
