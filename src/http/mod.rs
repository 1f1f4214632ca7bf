//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info, graceful shutdown)
//!     → pipeline layers (middleware.rs, request.rs)
//!     → context.rs (principal attached once, read by gates and handlers)
//!     → handlers.rs
//!     → response.rs (JSON envelopes)
//! ```

pub mod context;
pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use context::CurrentPrincipal;
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use server::{AppState, Backends, HttpServer};
