//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges (timeouts > 0)
//! - Check that supported methods are HTTP methods
//! - Warn about rule patterns that will never match
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Bad rule patterns are logged, never rejected: the matcher skips them
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Method;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
    #[error("unsupported HTTP method '{0}'")]
    InvalidMethod(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener", &config.listener.bind_address);
    check_address(&mut errors, "backend", &config.backend.address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "metrics", &config.observability.metrics_address);
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroValue { field: "listener.max_connections" });
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.request_secs" });
    }
    if config.timeouts.forward_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "timeouts.forward_secs" });
    }
    if config.lifecycle.close_anyway_after_secs == 0 {
        errors.push(ValidationError::ZeroValue { field: "lifecycle.close_anyway_after_secs" });
    }

    for method in &config.validation.supported_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidMethod(method.clone()));
        }
    }

    for (index, rule) in config.validation.rules.iter().enumerate() {
        for pattern in [&rule.method_pattern, &rule.url_pattern] {
            if let Err(e) = regex::Regex::new(pattern) {
                tracing::warn!(rule = index, pattern = %pattern, error = %e, "Rule pattern does not compile; lookups reaching it will find no rule");
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
