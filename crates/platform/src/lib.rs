//! Platform services shared by every admin handler: the append-only audit
//! log, tenant directory and resolver, per-tenant storage namespaces,
//! capability gates, sessions, step-up MFA, and impersonation signing.

pub mod audit;
pub mod gate;
pub mod impersonation;
pub mod mfa;
pub mod namespace;
pub mod session;
pub mod tenancy;

pub use audit::{AuditLog, AuditLogEntry, AuditQuery, AuditRecord, ChainVerification};
pub use gate::AccessPolicy;
pub use impersonation::{ImpersonationClaims, ImpersonationSigner};
pub use mfa::{MfaEnrollment, MfaVerifier, StepUpMethod, StepUpProof};
pub use namespace::NamespaceStore;
pub use session::{Session, SessionStore};
pub use tenancy::{TenantDirectory, TenantResolver};
