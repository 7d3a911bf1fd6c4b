//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, worker count >= 1)
//! - Check addresses against the configured network
//!
//! Returns all validation errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::chain::types::FULL_WEIGHT;
use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` for values serde cannot reject on its own.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be greater than 0"));
    }
    if config.chain.poll_interval_ms == 0 {
        errors.push(ValidationError::new("chain.poll_interval_ms", "must be greater than 0"));
    }
    if config.chain.max_polls == Some(0) {
        errors.push(ValidationError::new("chain.max_polls", "must be greater than 0 when set"));
    }

    if let Some(address) = &config.admin.address {
        if let Err(e) = config.chain.network.parse_address(address) {
            errors.push(ValidationError::new("admin.address", e.to_string()));
        }
    }
    if config.admin.private_key_env.trim().is_empty() {
        errors.push(ValidationError::new("admin.private_key_env", "must not be empty"));
    }

    if config.workers.count == 0 {
        errors.push(ValidationError::new("workers.count", "at least one worker is required"));
    }

    if config.keys.default_weight < FULL_WEIGHT {
        errors.push(ValidationError::new(
            "keys.default_weight",
            format!("a single key must carry full weight ({})", FULL_WEIGHT),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
