//! The per-request lifecycle.
//!
//! A [`PendingRequest`] binds one [`RequestDescriptor`](crate::protocol::RequestDescriptor)
//! to the handler that receives its outcome, and moves through [`PendingState`] as the
//! connection reports progress:
//!
//! ```text
//! Created ──send──▶ Sending ──sent──▶ AwaitingResponse ──response──▶ Completed
//!    │                 │                     │
//!    │                 └───────error─────────┴──────────────────────▶ Failed
//!    └─────────────────────────cancel (any non-terminal state)───────▶ Cancelled
//! ```
//!
//! Terminal states are absorbing and the handler is invoked at most once, on the
//! transition into `Completed` or `Failed`.

mod pending_request;

pub use pending_request::PendingRequest;
pub use pending_request::PendingState;
pub use pending_request::RequestId;
pub use pending_request::StateError;
