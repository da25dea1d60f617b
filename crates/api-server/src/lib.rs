//! Admin REST surface for the control plane.
//!
//! All admin routes live under `/api/v1/admin` and answer with the
//! `{success, data | error, meta?}` envelope from [`envelope`].

#![warn(clippy::unwrap_used)]

pub mod approval_rest;
pub mod auth;
pub mod envelope;
pub mod integration_rest;
pub mod metrics_rest;
pub mod rest;
pub mod router;
pub mod server;
pub mod state;
pub mod support_rest;
pub mod tenant_rest;

pub use envelope::{ApiError, ApiResponse};
pub use router::build_router;
pub use server::ApiServer;
pub use state::AppState;
