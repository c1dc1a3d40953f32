//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0)
//! - Detect conflicting or malformed endpoint paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::BridgeConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.host must not be empty")]
    EmptyHost,

    #[error("routes.{field} must start with '/', got {value:?}")]
    RelativePath { field: &'static str, value: String },

    #[error("path {0:?} is assigned to more than one route")]
    DuplicatePath(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    let paths = [
        ("ws_path", &config.routes.ws_path),
        ("query_path", &config.routes.query_path),
        ("status_path", &config.routes.status_path),
    ];
    for (i, &(field, value)) in paths.iter().enumerate() {
        if !value.starts_with('/') {
            errors.push(ValidationError::RelativePath {
                field,
                value: value.to_string(),
            });
        }
        if paths[..i].iter().any(|(_, earlier)| *earlier == value) {
            errors.push(ValidationError::DuplicatePath(value.to_string()));
        }
    }

    if config.timeouts.write_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("write_timeout_ms"));
    }
    if config.timeouts.read_timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout("read_timeout_ms"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
