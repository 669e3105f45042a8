//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and budgets > 0, parseable addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RpcConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RpcConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid log level {0:?}")]
    LogLevel(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &RpcConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let transport = &config.transport;
    for (field, value) in [
        ("transport.buffer_size", transport.buffer_size),
        ("transport.max_connections", transport.max_connections),
        ("transport.accept_backlog", transport.accept_backlog),
        ("transport.max_frame_bytes", transport.max_frame_bytes),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let timeouts = &config.timeouts;
    if timeouts.dial_ms == 0 {
        errors.push(ValidationError::Zero { field: "timeouts.dial_ms" });
    }
    if timeouts.client_call_ms == Some(0) {
        errors.push(ValidationError::Zero { field: "timeouts.client_call_ms" });
    }
    if timeouts.server_call_ms == Some(0) {
        errors.push(ValidationError::Zero { field: "timeouts.server_call_ms" });
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
