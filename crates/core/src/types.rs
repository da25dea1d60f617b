//! Records shared across the control plane: tenants, users, caller identity,
//! the per-request tenant context, and the approval classification enums the
//! configuration layer refers to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Limit value meaning "no cap".
pub const UNLIMITED: i64 = -1;

// ─── Tenant ─────────────────────────────────────────────────────────────

/// Subscription tier sold to a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Starter,
    Professional,
    Enterprise,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 3] = [Self::Starter, Self::Professional, Self::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
        }
    }

    /// Suspended and cancelled tenants are read-only.
    pub fn allows_writes(&self) -> bool {
        matches!(self, Self::Trial | Self::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability entry in a tenant's feature map: either a switch or a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Enabled(bool),
    Limit(i64),
}

impl FeatureValue {
    /// A limit of zero disables the capability; any other limit enables it.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(on) => *on,
            Self::Limit(n) => *n != 0,
        }
    }

    /// Numeric cap for limit-style features (`UNLIMITED` for switches that are on).
    pub fn limit(&self) -> i64 {
        match self {
            Self::Enabled(true) => UNLIMITED,
            Self::Enabled(false) => 0,
            Self::Limit(n) => *n,
        }
    }
}

/// An isolated customer account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub idp_org_ref: Option<String>,
    /// Storage namespace; unique and immutable once assigned.
    pub namespace: String,
    pub tier: SubscriptionTier,
    pub status: SubscriptionStatus,
    pub features: BTreeMap<String, FeatureValue>,
    pub max_users: i64,
    pub max_entities: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Tenant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn feature(&self, capability: &str) -> Option<FeatureValue> {
        self.features.get(capability).copied()
    }

    pub fn has_feature(&self, capability: &str) -> bool {
        self.feature(capability).is_some_and(|v| v.is_enabled())
    }
}

// ─── User ───────────────────────────────────────────────────────────────

/// Role of a user within its tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Manager,
    Viewer,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

/// A user belongs to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub mfa_enabled: bool,
    /// Base32 TOTP secret, present only while MFA is enabled.
    #[serde(skip_serializing, default)]
    pub mfa_secret: Option<String>,
    /// SHA-256 hex digests of unused backup codes.
    #[serde(skip_serializing, default)]
    pub mfa_backup_codes: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(tenant_id: Uuid, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: email.into(),
            role,
            mfa_enabled: false,
            mfa_secret: None,
            mfa_backup_codes: Vec::new(),
            last_login_at: None,
            created_at: Utc::now(),
        }
    }
}

// ─── Request identity ───────────────────────────────────────────────────

/// Authenticated caller as established by the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: Uuid,
    pub session_id: Uuid,
    /// Platform operators may use the cross-tenant master admin surface.
    pub platform_operator: bool,
}

impl CallerIdentity {
    /// Audit actor string for this caller: the bare user id.
    pub fn actor(&self) -> String {
        self.user_id.to_string()
    }
}

/// Per-request tenant routing context.
///
/// Built fresh for every request by the tenant resolver and passed explicitly
/// to every data-access call; never cached across requests.
#[derive(Debug, Clone)]
pub struct TenantContext {
    request_id: Uuid,
    tenant: Tenant,
    user: User,
    caller: CallerIdentity,
}

impl TenantContext {
    pub fn new(tenant: Tenant, user: User, caller: CallerIdentity) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant,
            user,
            caller,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant.id
    }

    pub fn namespace(&self) -> &str {
        &self.tenant.namespace
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }
}

// ─── Approval classification ────────────────────────────────────────────

/// Kind of privileged change an approval request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalType {
    FeatureFlag,
    ConfigChange,
    DestructiveOp,
    IntegrationChange,
    AccessGrant,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureFlag => "feature-flag",
            Self::ConfigChange => "config-change",
            Self::DestructiveOp => "destructive-op",
            Self::IntegrationChange => "integration-change",
            Self::AccessGrant => "access-grant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalCategory {
    Security,
    Configuration,
    Operational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ApprovalPriority {
    /// Higher rank means more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}
