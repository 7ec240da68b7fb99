//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool size > 0)
//! - Check that addresses and header values parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("relay.connect_timeout_secs ({connect}) exceeds relay.timeout_secs ({total})")]
    ConnectExceedsTotal { connect: u64, total: u64 },

    #[error("relay.user_agent is not a valid header value")]
    InvalidUserAgent,

    #[error("access_log.skip_paths: '{0}' must start with '/'")]
    RelativeSkipPath(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let relay = &config.relay;
    for (field, value) in [
        ("relay.timeout_secs", relay.timeout_secs),
        ("relay.connect_timeout_secs", relay.connect_timeout_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if relay.pool_max_idle_per_host == 0 {
        errors.push(ValidationError::Zero {
            field: "relay.pool_max_idle_per_host",
        });
    }

    if relay.connect_timeout_secs > relay.timeout_secs {
        errors.push(ValidationError::ConnectExceedsTotal {
            connect: relay.connect_timeout_secs,
            total: relay.timeout_secs,
        });
    }

    if HeaderValue::from_str(&relay.user_agent).is_err() {
        errors.push(ValidationError::InvalidUserAgent);
    }

    for path in &config.access_log.skip_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::RelativeSkipPath(path.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
