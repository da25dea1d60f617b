//! Master admin surface: provider-level management for the control plane.
//! Composes tenancy, approvals, integrations and audit into a unified
//! administration surface for platform operators.
//!
//! # Modules
//!
//! - [`tenant_ops`]: Tenant lifecycle (create, signup, patch, suspend, reactivate, soft delete)
//! - [`provider_dashboard`]: Cross-tenant overview, revenue estimate and system health
//! - [`impersonation`]: Audited support impersonation tokens

pub mod impersonation;
pub mod provider_dashboard;
pub mod tenant_ops;

pub use impersonation::{ImpersonationGrant, ImpersonationService};
pub use provider_dashboard::ProviderDashboard;
pub use tenant_ops::TenantOps;
