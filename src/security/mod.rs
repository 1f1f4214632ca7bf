//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (check per-IP token bucket)
//!     → auth (resolve bearer token into a Principal)
//!     → per-route gate chain
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, ClientLimiterRegistry};
