//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store round-trip (credential lookup, permission lookup, conditional update):
//!     → timeouts.rs (enforce operation deadline)
//!     → On timeout: StoreError::Timeout → 500, request safe to retry
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No automatic retries: an edit conflict or a fault goes back to the caller

pub mod timeouts;

pub use timeouts::with_deadline;
