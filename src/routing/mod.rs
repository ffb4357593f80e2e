//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request URI
//!     → target.rs (join backend base path, keep query)
//!     → http://backend/... for passthrough
//!     → ws(s)://backend/... for upgrades
//! ```
//!
//! # Design Decisions
//! - Exactly one backend endpoint; there is no route table
//! - Endpoint is parsed once at startup and cloned into handlers

pub mod target;

pub use target::{single_joining_slash, Endpoint, EndpointError};
