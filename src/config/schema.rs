//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::validation::ValidationRule;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, in-flight limit).
    pub listener: ListenerConfig,

    /// The single backend every request is forwarded to.
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Schema validation settings and rules.
    pub validation: ValidationConfig,

    /// Outbound client lifecycle settings.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum requests handled concurrently (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one inbound request, in seconds.
    pub request_secs: u64,

    /// Timeout of a forwarded call, response body included, in seconds.
    pub forward_secs: u64,
}

impl TimeoutConfig {
    pub fn forward(&self) -> Duration {
        Duration::from_secs(self.forward_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 180,
            forward_secs: 120,
        }
    }
}

/// Schema validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject invalid bodies (true) or only log a warning (false).
    pub fail_on_error: bool,

    /// Methods that may be validated at all.
    pub supported_methods: Vec<String>,

    /// Directory schema locations are resolved against.
    pub schema_root: PathBuf,

    /// Largest body buffered for validation, in bytes.
    pub max_body_bytes: usize,

    /// Ordered validation rules. First match wins.
    pub rules: Vec<ValidationRule>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            fail_on_error: true,
            supported_methods: vec!["PUT".to_string(), "GET".to_string(), "POST".to_string()],
            schema_root: PathBuf::from("./schemas"),
            max_body_bytes: 10 * 1024 * 1024, // 10MB
            rules: Vec::new(),
        }
    }
}

/// Outbound client lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// A client asked to close is closed after this many seconds even if
    /// request/response cycles are still open.
    pub close_anyway_after_secs: u64,
}

impl LifecycleConfig {
    pub fn close_anyway_after(&self) -> Duration {
        Duration::from_secs(self.close_anyway_after_secs)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            close_anyway_after_secs: 86_400, // one day
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert!(config.validation.fail_on_error);
        assert_eq!(config.validation.supported_methods, vec!["PUT", "GET", "POST"]);
        assert_eq!(config.timeouts.forward_secs, 120);
        assert_eq!(config.lifecycle.close_anyway_after(), Duration::from_secs(86_400));
    }

    #[test]
    fn rules_keep_file_order() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            address = "127.0.0.1:4000"

            [[validation.rules]]
            method = "PUT"
            url = "/a/.*"
            schema_location = "/schemas/a"

            [[validation.rules]]
            method = "GET|POST"
            url = "/b/.*"
            keep_in_memory = "3600"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.address, "127.0.0.1:4000");
        assert_eq!(config.validation.rules.len(), 2);
        assert_eq!(config.validation.rules[0].url_pattern, "/a/.*");
        assert_eq!(config.validation.rules[1].method_pattern, "GET|POST");
        assert!(config.validation.rules[1].schema_location.is_none());
    }
}
