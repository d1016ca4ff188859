//! Schema resolution.
//!
//! # Responsibilities
//! - Turn a [`SchemaLocation`] into a compiled schema
//! - Cache compiled schemas for as long as the rule allows
//!
//! # Design Decisions
//! - Resolvers are async: the first lookup may hit storage
//! - `keep_in_memory` is a TTL in seconds; without it every lookup reloads
//! - Schema locations are confined to the schema root

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::time::Instant;

use crate::validation::rule::SchemaLocation;

/// Errors raised while resolving a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema not found: {0}")]
    NotFound(String),
    #[error("schema {location} could not be parsed: {message}")]
    Parse { location: String, message: String },
    #[error("schema {location} could not be read: {message}")]
    Io { location: String, message: String },
}

/// One problem found in a validated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON pointer into the instance.
    pub path: String,
    pub message: String,
}

/// A compiled JSON schema.
#[derive(Debug)]
pub struct SchemaArtifact {
    location: String,
    validator: jsonschema::Validator,
}

impl SchemaArtifact {
    pub fn compile(location: impl Into<String>, document: &Value) -> Result<Self, SchemaError> {
        let location = location.into();
        let validator = jsonschema::validator_for(document).map_err(|e| SchemaError::Parse {
            location: location.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { location, validator })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// All violations of this schema in `instance`; empty when valid.
    pub fn violations(&self, instance: &Value) -> Vec<Violation> {
        self.validator
            .iter_errors(instance)
            .map(|error| Violation {
                path: error.instance_path.to_string(),
                message: error.to_string(),
            })
            .collect()
    }
}

/// Resolves schema locations to compiled schemas.
#[async_trait]
pub trait SchemaResolver: Send + Sync {
    async fn resolve(&self, location: &SchemaLocation) -> Result<Arc<SchemaArtifact>, SchemaError>;
}

/// Resolver over schemas registered up front.
#[derive(Debug, Default)]
pub struct InMemorySchemaResolver {
    schemas: DashMap<String, Arc<SchemaArtifact>>,
}

impl InMemorySchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register `document` under `location`.
    pub fn insert(&self, location: &str, document: &Value) -> Result<(), SchemaError> {
        let artifact = SchemaArtifact::compile(location, document)?;
        self.schemas.insert(location.to_string(), Arc::new(artifact));
        Ok(())
    }
}

#[async_trait]
impl SchemaResolver for InMemorySchemaResolver {
    async fn resolve(&self, location: &SchemaLocation) -> Result<Arc<SchemaArtifact>, SchemaError> {
        self.schemas
            .get(&location.location)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchemaError::NotFound(location.location.clone()))
    }
}

#[derive(Debug)]
struct CachedSchema {
    artifact: Arc<SchemaArtifact>,
    expires_at: Instant,
}

/// Resolver reading JSON schema documents below a root directory.
///
/// A location such as `/schemas/item` resolves to `<root>/schemas/item`,
/// falling back to `<root>/schemas/item.json`.
#[derive(Debug)]
pub struct FileSchemaResolver {
    root: PathBuf,
    cache: DashMap<String, CachedSchema>,
}

impl FileSchemaResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cached(&self, location: &str) -> Option<Arc<SchemaArtifact>> {
        let entry = self.cache.get(location)?;
        if entry.expires_at > Instant::now() {
            Some(Arc::clone(&entry.artifact))
        } else {
            None
        }
    }

    fn path_for(&self, location: &str) -> Result<PathBuf, SchemaError> {
        let relative = Path::new(location.trim_start_matches('/'));
        let confined = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined || relative.as_os_str().is_empty() {
            return Err(SchemaError::NotFound(location.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>, SchemaError> {
        let path = self.path_for(location)?;
        let mut candidates = vec![path.clone()];
        if path.extension().is_none() {
            candidates.push(path.with_extension("json"));
        }

        for candidate in candidates {
            match tokio::fs::read(&candidate).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SchemaError::Io {
                        location: location.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }
        Err(SchemaError::NotFound(location.to_string()))
    }

    async fn load(&self, location: &str) -> Result<SchemaArtifact, SchemaError> {
        let bytes = self.read(location).await?;
        let document: Value = serde_json::from_slice(&bytes).map_err(|e| SchemaError::Parse {
            location: location.to_string(),
            message: e.to_string(),
        })?;
        SchemaArtifact::compile(location, &document)
    }
}

#[async_trait]
impl SchemaResolver for FileSchemaResolver {
    async fn resolve(&self, location: &SchemaLocation) -> Result<Arc<SchemaArtifact>, SchemaError> {
        if location.keep_in_memory.is_some() {
            if let Some(artifact) = self.cached(&location.location) {
                return Ok(artifact);
            }
        }

        let artifact = Arc::new(self.load(&location.location).await?);
        match location.keep_in_memory {
            Some(secs) => {
                tracing::debug!(location = %location.location, keep_secs = secs, "Caching schema");
                self.cache.insert(
                    location.location.clone(),
                    CachedSchema {
                        artifact: Arc::clone(&artifact),
                        expires_at: Instant::now() + Duration::from_secs(secs),
                    },
                );
            }
            None => {
                self.cache.remove(&location.location);
            }
        }
        Ok(artifact)
    }
}
