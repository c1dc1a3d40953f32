//! Backend bridge subsystem.
//!
//! # Data Flow
//! ```text
//! query()
//!     → table.rs (register token + reply slot)
//!     → connection.rs (write tagged message, bounded by write deadline)
//!     → backend peer
//!     → manager.rs pump (read frame, parse Reply)
//!     → table.rs (match token, deliver to slot)
//!     → query() returns payload, or Timeout after the read deadline
//! ```
//!
//! # Design Decisions
//! - Exactly one backend connection; a new upgrade supersedes the old one
//! - Replies are matched strictly by token, never by arrival order
//! - Unmatched replies are dropped; there is no catch-all inbox
//! - No retries and no reconnection from this side

pub mod connection;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod table;

pub use connection::{ConnectionHandle, ConnectionId, FrameSink, FrameStream};
pub use error::{BridgeError, BridgeResult, TransportError};
pub use manager::{ConnectionManager, Deadlines, ManagerStatus};
pub use protocol::{Message, MessageKind, Payload, Reply, Token};
pub use table::{CorrelationTable, Delivery, Pending, TableSnapshot};
