//! Two-person, step-up-gated approval workflow for privileged tenant changes.

pub mod applier;
pub mod engine;
pub mod model;
pub mod policy;

pub use applier::{ChangeApplier, TenantChangeApplier};
pub use engine::ApprovalEngine;
pub use model::{ApprovalFilter, ApprovalRequest, ApprovalStatus, NewApprovalRequest, StateTransition};
pub use policy::AutoApprovalPolicy;
