//! Concord-Admin: Authenticated Control Plane
//!
//! The HTTP surface over the decision plane: JWT auth with role-based
//! authorization, validated DTOs, idempotent mutations, standardized error
//! envelopes, request metrics and the approve/reject/rollback/explain
//! operations.
//!
//! # Request pipeline
//!
//! ```text
//! correlation id ─► timeout guard ─► metrics ─► JWT auth ─► role guard
//!      ─► validation ─► idempotency ─► handler ─► standardized response
//! ```

pub mod agents;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod middleware;
pub mod pagination;
pub mod routes;
pub mod state;

pub use bootstrap::{build_plane, DecisionPlane};
pub use config::AdminConfig;
pub use error::{ApiError, ErrorCode};
pub use state::AppState;
