//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace span, in-flight cap)
//!     → ValidationGate (validate or pass through)
//!     → ValidationPipeline / guarded client
//!     → response.rs (error mapping, rejections)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use response::ForwardError;
pub use server::{AppState, GatewayRuntime, HttpServer};
