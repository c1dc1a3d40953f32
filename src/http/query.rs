//! Query and status handlers.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use std::time::Instant;

use crate::bridge::ManagerStatus;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Forward one query to the backend peer and return its payload.
pub async fn query_handler(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();

    match state.manager.query().await {
        Ok(payload) => {
            metrics::record_query("ok", started);
            tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Query answered");
            Ok(payload)
        }
        Err(e) => {
            metrics::record_query(e.kind(), started);
            tracing::warn!(reason = e.kind(), error = %e, "Query failed");
            Err(e)
        }
    }
}

#[derive(Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    #[serde(flatten)]
    pub manager: ManagerStatus,
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        manager: state.manager.status().await,
    })
}
