//! Outbound client subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline / pass-through handler
//!     → guard.rs (count cycle, attach token to response body)
//!     → outbound.rs (rewrite URI, pooled hyper client)
//!     → Backend
//!
//! Reload / shutdown:
//!     request_close()
//!     → idle? close delegate now
//!     → busy? drain, close on last cycle end (or when the deadline passes)
//! ```
//!
//! # Design Decisions
//! - Only the guard closes the shared delegate; requests never do
//! - Lifecycle bookkeeping happens synchronously when a request is issued
//! - Everything except `request` and `close` goes straight to the delegate

pub mod copy;
pub mod guard;
pub mod outbound;

#[cfg(test)]
pub(crate) mod mock;

pub use copy::{copy_resource, CopyError, CopyTask};
pub use guard::{CloseDisposition, CycleToken, DeferCloseClient, GuardState};
pub use outbound::{ClientError, HyperClient, OutboundClient};

/// The client type the server runs with.
pub type GatewayClient = DeferCloseClient<HyperClient>;
