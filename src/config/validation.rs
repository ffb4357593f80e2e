//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check URLs and header names before they reach the request path
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    match Url::parse(&config.backend.endpoint) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") {
                errors.push(ValidationError::new(
                    "backend.endpoint",
                    format!("unsupported scheme '{}'", url.scheme()),
                ));
            }
            if url.host_str().is_none() {
                errors.push(ValidationError::new("backend.endpoint", "missing host"));
            }
        }
        Err(e) => errors.push(ValidationError::new(
            "backend.endpoint",
            format!("invalid URL: {}", e),
        )),
    }

    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("backend.connect_timeout_secs", "must be > 0"));
    }

    for name in &config.headers.blacklist {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "headers.blacklist",
                format!("'{}' is not a header name", name),
            ));
        }
    }

    if let Some(origin) = &config.headers.backend_origin {
        if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::new(
                "headers.backend_origin",
                format!("'{}' is not a header value", origin),
            ));
        }
    }

    let trusted = &config.websocket.trusted_origin;
    if !trusted.is_empty() && Url::parse(trusted).map(|u| u.host_str().is_none()).unwrap_or(true) {
        errors.push(ValidationError::new(
            "websocket.trusted_origin",
            format!("'{}' is not an origin URL with a host", trusted),
        ));
    }

    if config.websocket.ping_interval_secs == 0 {
        errors.push(ValidationError::new("websocket.ping_interval_secs", "must be > 0"));
    }
    if config.websocket.write_timeout_secs == 0 {
        errors.push(ValidationError::new("websocket.write_timeout_secs", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
