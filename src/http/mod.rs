//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → proxy_handler (strip blacklisted headers via headers.rs)
//!         ├─ Upgrade: websocket → websocket::session
//!         └─ otherwise          → passthrough.rs (forward, stream response back)
//! ```

pub mod headers;
pub mod passthrough;
pub mod server;

pub use headers::{HeaderPolicy, UpgradeHeaders};
pub use passthrough::{Passthrough, PassthroughError};
pub use server::{AppState, HttpServer, ServerError};
