//! WebSocket proxying.
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//!
//! session.rs   (handshake, dial, origin check, upgrade)
//!     → connector.rs (backend upgrade through the shared client)
//!     → origin.rs    (accept predicate)
//!     → relay.rs     (two loops + keepalive)
//!         → frame.rs (message conversion)
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions
//! - Ping/pong stay on their own leg: each side answers its peer, the proxy adds keepalive pings

pub mod connector;
pub mod frame;
pub mod origin;
pub mod relay;
pub mod session;

pub use connector::{BackendConnector, DialError};
pub use relay::{RelayError, RelaySettings};
pub use session::WebSocketProxy;
