//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → listener stops accepting → in-flight HTTP drains → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every server loop holds its own receiver
//! - Relaying WebSocket sessions are not drained, only counted and reported

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
