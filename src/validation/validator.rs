//! Body validation against a resolved schema.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::validation::rule::SchemaLocation;
use crate::validation::schema::SchemaResolver;

/// Result of one validation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            success: true,
            message: None,
            details: None,
        }
    }

    pub fn invalid(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            details,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Structured violations, when the body was JSON but broke the schema.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }
}

/// Validates bodies against schemas looked up through a [`SchemaResolver`].
///
/// Resolution failures and unparsable bodies are reported as failed
/// outcomes; nothing here returns an error.
#[derive(Clone)]
pub struct SchemaValidator {
    resolver: Arc<dyn SchemaResolver>,
}

impl SchemaValidator {
    pub fn new(resolver: Arc<dyn SchemaResolver>) -> Self {
        Self { resolver }
    }

    /// Validate `body` for the stage named by `tag` (e.g. `PUT/in`).
    /// Without a location the body is accepted as is.
    pub async fn validate(&self, tag: &str, body: &[u8], location: Option<&SchemaLocation>) -> ValidationOutcome {
        let Some(location) = location else {
            tracing::debug!(tag, "No schema configured for rule, skipping validation");
            return ValidationOutcome::valid();
        };

        let artifact = match self.resolver.resolve(location).await {
            Ok(artifact) => artifact,
            Err(e) => {
                return ValidationOutcome::invalid(format!("{}: could not load schema: {}", tag, e), None);
            }
        };

        let instance: Value = match serde_json::from_slice(body) {
            Ok(instance) => instance,
            Err(e) => {
                return ValidationOutcome::invalid(format!("{}: body is not valid JSON: {}", tag, e), None);
            }
        };

        let violations = artifact.violations(&instance);
        if violations.is_empty() {
            return ValidationOutcome::valid();
        }

        let details = violations
            .iter()
            .map(|v| json!({ "path": v.path, "message": v.message }))
            .collect();
        ValidationOutcome::invalid(
            format!(
                "{}: body does not match schema {} ({} violation(s))",
                tag,
                artifact.location(),
                violations.len()
            ),
            Some(Value::Array(details)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::schema::InMemorySchemaResolver;

    fn validator() -> SchemaValidator {
        let resolver = InMemorySchemaResolver::new();
        resolver
            .insert(
                "/schemas/a",
                &json!({"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}),
            )
            .unwrap();
        SchemaValidator::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn conforming_body_is_valid() {
        let outcome = validator()
            .validate("PUT/in", br#"{"name":"x"}"#, Some(&SchemaLocation::new("/schemas/a")))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.message(), None);
    }

    #[tokio::test]
    async fn violation_carries_details() {
        let outcome = validator()
            .validate("PUT/in", br#"{"name":1}"#, Some(&SchemaLocation::new("/schemas/a")))
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.message().unwrap().starts_with("PUT/in"));
        let details = outcome.details().unwrap().as_array().unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0]["path"], "/name");
    }

    #[tokio::test]
    async fn non_json_body_fails_without_details() {
        let outcome = validator()
            .validate("POST/in", b"<xml/>", Some(&SchemaLocation::new("/schemas/a")))
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.details().is_none());
    }

    #[tokio::test]
    async fn unresolvable_schema_fails() {
        let outcome = validator()
            .validate("GET/out", b"{}", Some(&SchemaLocation::new("/schemas/none")))
            .await;
        assert!(!outcome.is_success());
        assert!(outcome.message().unwrap().contains("schema not found"));
    }

    #[tokio::test]
    async fn missing_location_passes() {
        let outcome = validator().validate("PUT/in", b"anything", None).await;
        assert!(outcome.is_success());
    }
}
