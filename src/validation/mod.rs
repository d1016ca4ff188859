//! Validation subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → gate.rs (JSON? no extension? supported method? not a hook call?)
//!     → matcher.rs (first rule whose method and URL patterns match)
//!     → pipeline.rs
//!         → validator.rs (check request body)  ← schema.rs (resolve, compile, cache)
//!         → forward through the guarded client
//!         → validator.rs (check response body)
//!     → Client response
//!
//! Config reload:
//!     → source.rs (publish a new rule snapshot)
//!     → next match sees the new rules
//! ```
//!
//! # Design Decisions
//! - Rule lookups never block on a reload
//! - A broken pattern means no rule applies, never an error
//! - Validation failures are data (`ValidationOutcome`), not errors

pub mod gate;
pub mod matcher;
pub mod pipeline;
pub mod rule;
pub mod schema;
pub mod source;
pub mod validator;

pub use gate::ValidationGate;
pub use matcher::RuleMatcher;
pub use pipeline::{PipelineOutcome, PipelineSettings, ValidationPipeline};
pub use rule::{KeepInMemory, SchemaLocation, ValidationRule};
pub use schema::{FileSchemaResolver, InMemorySchemaResolver, SchemaArtifact, SchemaError, SchemaResolver, Violation};
pub use source::{RuleStore, ValidationRuleSource};
pub use validator::{SchemaValidator, ValidationOutcome};
