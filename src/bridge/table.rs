//! Correlation table: outstanding tokens and their reply slots.
//!
//! Flow:
//! 1. `query()` calls `register()` and gets a [`Pending`] guard
//! 2. The query message goes out tagged with the guard's token
//! 3. The pump calls `deliver()` with each parsed reply
//! 4. The guard is awaited with a deadline, and deregisters on drop
//!
//! Removal from the map is the only arbiter between delivery, timeout and
//! cancellation: whichever side removes the entry owns the outcome.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

use crate::bridge::error::BridgeError;
use crate::bridge::protocol::{Reply, Token};

/// Counters for the correlation table.
#[derive(Debug, Default)]
pub struct TableStats {
    /// Tokens registered.
    pub registered: AtomicU64,
    /// Replies handed to a waiting caller.
    pub delivered: AtomicU64,
    /// Waits that ran out of time.
    pub timed_out: AtomicU64,
    /// Registrations dropped before a reply (send failure, caller gone).
    pub cancelled: AtomicU64,
    /// Replies that matched no outstanding token.
    pub unmatched: AtomicU64,
}

/// Point-in-time copy of [`TableStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableSnapshot {
    pub registered: u64,
    pub delivered: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub unmatched: u64,
}

impl TableStats {
    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }
}

/// What happened to an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the caller that owns the token.
    Delivered,
    /// The caller stopped waiting between removal and hand-off.
    Abandoned,
    /// No outstanding token matched.
    Unmatched,
}

/// Map from outstanding token to its single-use reply slot.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    slots: DashMap<Token, oneshot::Sender<Reply>>,
    stats: TableStats,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token and return the guard that waits on it.
    pub fn register(&self) -> Pending<'_> {
        let (tx, rx) = oneshot::channel();
        let token = loop {
            let token = Token::generate();
            if let Entry::Vacant(slot) = self.slots.entry(token.clone()) {
                slot.insert(tx);
                break token;
            }
        };
        self.stats.registered.fetch_add(1, Ordering::Relaxed);
        debug!(token = %token, "Registered pending query");

        Pending {
            table: self,
            token,
            rx,
            created_at: Instant::now(),
            settled: false,
        }
    }

    /// Route a reply to the caller waiting on its token.
    pub fn deliver(&self, reply: Reply) -> Delivery {
        let Some(token) = reply.token() else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding reply without a token");
            return Delivery::Unmatched;
        };

        match self.slots.remove(&token) {
            Some((_, slot)) => match slot.send(reply) {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    debug!(token = %token, "Delivered reply");
                    Delivery::Delivered
                }
                Err(_) => {
                    debug!(token = %token, "Reply receiver dropped");
                    Delivery::Abandoned
                }
            },
            None => {
                self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
                debug!(token = %token, "Discarding reply for unknown or expired token");
                Delivery::Unmatched
            }
        }
    }

    /// Check if a token is outstanding.
    pub fn contains(&self, token: &Token) -> bool {
        self.slots.contains_key(token)
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> &TableStats {
        &self.stats
    }

    fn remove(&self, token: &Token) -> bool {
        self.slots.remove(token).is_some()
    }
}

/// A registered token awaiting its reply.
///
/// Dropping the guard before a reply arrives removes the token.
#[derive(Debug)]
pub struct Pending<'a> {
    table: &'a CorrelationTable,
    token: Token,
    rx: oneshot::Receiver<Reply>,
    created_at: Instant,
    settled: bool,
}

impl Pending<'_> {
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Wait for the reply for at most `budget`.
    pub async fn wait(mut self, budget: Duration) -> Result<Reply, BridgeError> {
        match tokio::time::timeout(budget, &mut self.rx).await {
            Ok(Ok(reply)) => {
                self.settled = true;
                debug!(
                    token = %self.token,
                    elapsed_ms = self.created_at.elapsed().as_millis() as u64,
                    "Reply received"
                );
                Ok(reply)
            }
            // The sender only disappears once its entry has been removed.
            Ok(Err(_)) => {
                self.settled = true;
                Err(BridgeError::Timeout(budget))
            }
            Err(_) => {
                self.settled = true;
                if self.table.remove(&self.token) {
                    self.table.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!(token = %self.token, budget_ms = budget.as_millis() as u64, "Pending query timed out");
                    return Err(BridgeError::Timeout(budget));
                }
                // Delivery removed the entry first; its send follows without yielding.
                (&mut self.rx).await.map_err(|_| BridgeError::Timeout(budget))
            }
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.settled && self.table.remove(&self.token) {
            self.table.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(token = %self.token, "Pending query cancelled");
        }
    }
}
