//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, timeouts > 0, address parses)
//! - Check cross-field relations (idle deadline vs. sweep interval)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GateConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let limiter = &config.rate_limit;
    if !(limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0) {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be a positive number",
        ));
    }
    if limiter.burst == 0 {
        errors.push(ValidationError::new("rate_limit.burst", "must be at least 1"));
    }
    if limiter.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.sweep_interval_secs",
            "must be greater than zero",
        ));
    } else if limiter.idle_deadline_secs < limiter.sweep_interval_secs {
        errors.push(ValidationError::new(
            "rate_limit.idle_deadline_secs",
            "must not be shorter than the sweep interval",
        ));
    }

    if config.store.operation_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "store.operation_timeout_ms",
            "must be greater than zero",
        ));
    }

    if config.tokens.authentication_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "tokens.authentication_ttl_secs",
            "must be greater than zero",
        ));
    }
    if config.tokens.activation_ttl_secs == 0 {
        errors.push(ValidationError::new(
            "tokens.activation_ttl_secs",
            "must be greater than zero",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than zero",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address when metrics are enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GateConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GateConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.store.operation_timeout_ms = 0;
        config.rate_limit.idle_deadline_secs = 10;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "rate_limit.idle_deadline_secs",
                "store.operation_timeout_ms",
            ]
        );
    }

    #[test]
    fn test_rejects_non_finite_rate() {
        let mut config = GateConfig::default();
        config.rate_limit.requests_per_second = f64::NAN;
        assert!(validate_config(&config).is_err());
    }
}
