//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The single backend every request is forwarded to.
    pub backend: BackendConfig,

    /// Header rewriting rules.
    pub headers: HeaderConfig,

    /// WebSocket upgrade and relay settings.
    pub websocket: WebSocketConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Backend endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend URL (scheme, host and base path), e.g. "https://10.0.0.1:6443/api".
    pub endpoint: String,

    /// Extra CA bundle (PEM) trusted when dialing the backend over TLS.
    pub ca_path: Option<String>,

    /// Dial and TLS handshake timeout in seconds.
    pub connect_timeout_secs: u64,

    /// TCP keepalive for pooled passthrough connections in seconds.
    pub keepalive_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8001".to_string(),
            ca_path: None,
            connect_timeout_secs: 30,
            keepalive_secs: 30,
        }
    }
}

/// Header rewriting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    /// Request headers removed before anything else happens.
    pub blacklist: Vec<String>,

    /// Value forced into the `Origin` header of backend WebSocket dials.
    /// `None` or an empty string forwards the client's Origin unchanged.
    pub backend_origin: Option<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            blacklist: vec!["X-CSRFToken".to_string()],
            backend_origin: Some("http://localhost".to_string()),
        }
    }
}

/// WebSocket session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Origin trusted for client upgrades. Empty allows every origin.
    pub trusted_origin: String,

    /// Interval between keepalive pings sent to the client, in seconds.
    pub ping_interval_secs: u64,

    /// Deadline for a keepalive ping write, in seconds.
    pub write_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            trusted_origin: String::new(),
            ping_interval_secs: 30,
            write_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
