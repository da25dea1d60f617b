//! Shared building blocks for the admin control plane: configuration,
//! the error taxonomy, and the tenant/user records every component consumes.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{ControlPlaneError, ControlPlaneResult, FieldIssue};
pub use types::{CallerIdentity, Tenant, TenantContext, User};
