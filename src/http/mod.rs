//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Backend peer
//!     → websocket.rs (upgrade, split, attach to manager)
//!
//! HTTP client
//!     → server.rs (Axum setup, CORS, tracing)
//!     → query.rs (ConnectionManager::query)
//!     → response.rs (payload as JSON, errors as 500)
//!     → Send to client
//! ```

pub mod query;
pub mod response;
pub mod server;
pub mod websocket;

pub use server::{AppState, HttpServer};
