//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → axum / axum-server (optional TLS handshake via tls.rs)
//!     → Hand off to HTTP layer
//!
//! Outgoing backend connection
//!     → client.rs (hyper-util client, HTTP/1.1 upgrades for WebSocket dials)
//!     → tls.rs (shared rustls client config)
//!
//! WebSocket session states (connection.rs):
//!     Dialing → Upgrading → Relaying → Closed
//! ```
//!
//! # Design Decisions
//! - TLS is optional on the listener and handled transparently
//! - One client TLS config for both passthrough and WebSocket dials
//! - Each relaying session is tracked so shutdown can report what it drops

pub mod client;
pub mod connection;
pub mod tls;

pub use client::{backend_client, BackendClient};
pub use connection::{SessionGuard, SessionId, SessionState, SessionTracker};
