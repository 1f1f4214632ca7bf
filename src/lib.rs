//! Request-gating and safe-mutation service.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::schema::GateConfig;
pub use error::{Error, Result, StoreError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::RequestPipeline;
