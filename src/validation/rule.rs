//! Validation rules and the schema locations they point at.

use serde::{Deserialize, Serialize};

/// Associates a method/URL pattern pair with the schema that bodies of
/// matching requests are checked against.
///
/// Patterns are regular expressions that must match the whole method or
/// request URI (path plus query).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ValidationRule {
    #[serde(rename = "method")]
    pub method_pattern: String,

    #[serde(rename = "url")]
    pub url_pattern: String,

    /// Where the schema lives. Without one the rule matches but nothing is
    /// enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<String>,

    /// How long the resolver may keep the parsed schema, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_in_memory: Option<KeepInMemory>,
}

/// Raw `keep_in_memory` value as written by the operator.
///
/// Any other value (float, bool, table) still loads and is ignored when the
/// schema location is built.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum KeepInMemory {
    Seconds(i64),
    Text(String),
    Other(serde_json::Value),
}

impl ValidationRule {
    pub fn new(method_pattern: &str, url_pattern: &str, schema_location: Option<&str>) -> Self {
        Self {
            method_pattern: method_pattern.to_string(),
            url_pattern: url_pattern.to_string(),
            schema_location: schema_location.map(str::to_string),
            keep_in_memory: None,
        }
    }

    pub fn with_keep_in_memory(mut self, keep_in_memory: KeepInMemory) -> Self {
        self.keep_in_memory = Some(keep_in_memory);
        self
    }

    /// The schema location to resolve, if the rule names one.
    ///
    /// A `keep_in_memory` value that is not a non-negative integer is logged
    /// and treated as unset.
    pub fn schema_location(&self) -> Option<SchemaLocation> {
        let location = self.schema_location.as_ref()?;
        let keep_in_memory = self.keep_in_memory.as_ref().and_then(|raw| {
            let parsed = match raw {
                KeepInMemory::Seconds(secs) => u64::try_from(*secs).ok(),
                KeepInMemory::Text(text) => text.trim().parse::<u64>().ok(),
                KeepInMemory::Other(_) => None,
            };
            if parsed.is_none() {
                tracing::warn!(value = ?raw, location = %location, "Property 'keep_in_memory' is not a number; ignoring it");
            }
            parsed
        });

        Some(SchemaLocation {
            location: location.clone(),
            keep_in_memory,
        })
    }
}

/// Identifies a schema for the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaLocation {
    pub location: String,
    /// Seconds the parsed schema may be cached.
    pub keep_in_memory: Option<u64>,
}

impl SchemaLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            keep_in_memory: None,
        }
    }
}
