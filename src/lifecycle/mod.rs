//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build stores → Spawn sweep → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Stop background tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Background tasks are spawned through the coordinator, never detached
//! - Shutdown has timeout: stuck tasks are aborted after the drain deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
