//! Schema-validating HTTP gateway.
//!
//! Sits in front of one backend. Requests that match a validation rule have
//! their JSON body checked against a schema before forwarding, and their JSON
//! response checked before it is returned. Everything else passes through.
//! All outbound calls share one client whose close is deferred until no
//! request/response cycle is in progress.

pub mod admin;
pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod validation;

pub use config::schema::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
