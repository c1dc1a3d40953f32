//! Response construction for the query endpoint.
//!
//! # Responsibilities
//! - Write the peer's payload verbatim as `application/json`
//! - Map bridge errors to HTTP status codes
//!
//! # Design Decisions
//! - Every bridge error collapses to 500 with the error's text

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::bridge::{BridgeError, Payload};

impl IntoResponse for Payload {
    fn into_response(self) -> Response {
        (
            [(header::CONTENT_TYPE, "application/json")],
            self.as_json().to_owned(),
        )
            .into_response()
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
