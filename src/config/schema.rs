//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the gatehouse service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, environment name).
    pub listener: ListenerConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Store round-trip settings.
    pub store: StoreConfig,

    /// Credential lifetimes.
    pub tokens: TokenConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,

    /// Deployment environment reported by the health check.
    pub env: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            env: "development".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When false every request is admitted.
    pub enabled: bool,

    /// Token refill rate per client, in requests per second.
    pub requests_per_second: f64,

    /// Bucket capacity (burst).
    pub burst: u32,

    /// Clients idle for longer than this are evicted by the sweep.
    pub idle_deadline_secs: u64,

    /// How often the sweep runs.
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn idle_deadline(&self) -> Duration {
        Duration::from_secs(self.idle_deadline_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            idle_deadline_secs: 180,
            sweep_interval_secs: 60,
        }
    }
}

/// Store round-trip configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Deadline for a single store operation, in milliseconds.
    pub operation_timeout_ms: u64,
}

impl StoreConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 3000,
        }
    }
}

/// Credential lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of an authentication token in seconds.
    pub authentication_ttl_secs: u64,

    /// Lifetime of an activation token in seconds.
    pub activation_ttl_secs: u64,
}

impl TokenConfig {
    pub fn authentication_ttl(&self) -> Duration {
        Duration::from_secs(self.authentication_ttl_secs)
    }

    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_secs)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            authentication_ttl_secs: 24 * 60 * 60,
            activation_ttl_secs: 3 * 24 * 60 * 60,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests. Empty disables CORS.
    pub trusted_origins: Vec<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long shutdown waits for background tasks, in seconds.
    pub shutdown_drain_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_drain_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: GateConfig = toml::from_str("").unwrap();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.burst, 4);
        assert_eq!(config.store.operation_timeout(), Duration::from_secs(3));
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_section_override() {
        let config: GateConfig = toml::from_str(
            r#"
            [rate_limit]
            requests_per_second = 10.5
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.requests_per_second, 10.5);
        assert_eq!(config.rate_limit.burst, 4);
        assert_eq!(config.rate_limit.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
