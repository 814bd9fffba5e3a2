//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every backend address is a usable `http://host:port` URL
//! - Validate value ranges (interval and timeout > 0, bind addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The pool would be empty.
    #[error("at least one backend must be configured")]
    NoBackends,

    /// Backend address is not a URL.
    #[error("backend address '{address}' is invalid: {reason}")]
    InvalidBackendAddress { address: String, reason: String },

    /// Only plain HTTP backends can be forwarded to.
    #[error("backend address '{address}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme { address: String, scheme: String },

    /// A socket address field does not parse.
    #[error("{field} '{value}' is not a valid socket address")]
    InvalidSocketAddress { field: &'static str, value: String },

    /// A duration that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// Probes would overlap the next cycle.
    #[error("health_check.timeout_secs ({timeout}) must be shorter than interval_secs ({interval})")]
    ProbeTimeoutTooLong { timeout: u64, interval: u64 },

    /// Admin API enabled with an empty or default key.
    #[error("admin.api_key must be set to a non-default value when the admin API is enabled")]
    WeakAdminKey,
}

/// Parse and check a backend address.
///
/// Accepts `http://host:port` (the port may be omitted and defaults to 80).
pub fn parse_backend_address(address: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(address).map_err(|e| ValidationError::InvalidBackendAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ValidationError::UnsupportedScheme {
            address: address.to_string(),
            scheme: url.scheme().to_string(),
        });
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ValidationError::InvalidBackendAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        }),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for backend in &config.backends {
        if let Err(e) = parse_backend_address(&backend.address) {
            errors.push(e);
        }
    }

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        let key = config.admin.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::WeakAdminKey);
        }
    }

    let health = &config.health_check;
    if health.interval_secs == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.interval_secs"));
    }
    if health.timeout_secs == 0 {
        errors.push(ValidationError::ZeroDuration("health_check.timeout_secs"));
    }
    if health.interval_secs > 0 && health.timeout_secs >= health.interval_secs {
        errors.push(ValidationError::ProbeTimeoutTooLong {
            timeout: health.timeout_secs,
            interval: health.interval_secs,
        });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroDuration("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroDuration("timeouts.request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddress {
            field,
            value: value.to_string(),
        });
    }
}
