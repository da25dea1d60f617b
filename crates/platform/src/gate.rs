//! Capability gates checked before a handler touches tenant data.
//!
//! Each gate is a pure function of the [`TenantContext`]. Handlers compose
//! them through [`AccessPolicy`], which checks in a fixed order: operator,
//! role, feature, then write access.

use controlplane_core::types::{CallerIdentity, TenantContext, UserRole};
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use tracing::warn;

/// Allow only when the tenant's feature map enables `capability`.
///
/// Absent features are disabled; so is a numeric limit of zero.
pub fn require_feature(ctx: &TenantContext, capability: &str) -> ControlPlaneResult<()> {
    if ctx.tenant().has_feature(capability) {
        return Ok(());
    }
    warn!(
        tenant_id = %ctx.tenant_id(),
        feature = capability,
        tier = %ctx.tenant().tier,
        "Feature gate denied"
    );
    metrics::counter!("gate.denied", "gate" => "feature").increment(1);
    Err(ControlPlaneError::FeatureNotAvailable {
        feature: capability.to_string(),
    })
}

/// Allow only when the user's role is in `allowed`.
pub fn require_role(ctx: &TenantContext, allowed: &[UserRole]) -> ControlPlaneResult<()> {
    if allowed.contains(&ctx.user().role) {
        return Ok(());
    }
    metrics::counter!("gate.denied", "gate" => "role").increment(1);
    Err(ControlPlaneError::Forbidden(format!(
        "role `{}` may not perform this action",
        ctx.user().role
    )))
}

/// Refuse mutations for suspended or cancelled tenants.
pub fn prevent_read_only(ctx: &TenantContext) -> ControlPlaneResult<()> {
    let status = ctx.tenant().status;
    if status.allows_writes() {
        return Ok(());
    }
    metrics::counter!("gate.denied", "gate" => "read_only").increment(1);
    Err(ControlPlaneError::SubscriptionInactive {
        status: status.to_string(),
    })
}

/// Allow only platform operators onto the cross-tenant surface.
pub fn require_platform_operator(caller: &CallerIdentity) -> ControlPlaneResult<()> {
    if caller.platform_operator {
        return Ok(());
    }
    metrics::counter!("gate.denied", "gate" => "operator").increment(1);
    Err(ControlPlaneError::Forbidden(
        "platform operator access required".into(),
    ))
}

/// Declarative bundle of gates for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    roles: Option<Vec<UserRole>>,
    feature: Option<&'static str>,
    write: bool,
}

impl AccessPolicy {
    /// Read-only access for any role.
    pub fn read() -> Self {
        Self::default()
    }

    /// Mutating access: blocked while the subscription is inactive.
    pub fn write() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn roles(mut self, roles: &[UserRole]) -> Self {
        self.roles = Some(roles.to_vec());
        self
    }

    pub fn feature(mut self, capability: &'static str) -> Self {
        self.feature = Some(capability);
        self
    }

    pub fn check(&self, ctx: &TenantContext) -> ControlPlaneResult<()> {
        if let Some(ref roles) = self.roles {
            require_role(ctx, roles)?;
        }
        if let Some(capability) = self.feature {
            require_feature(ctx, capability)?;
        }
        if self.write {
            prevent_read_only(ctx)?;
        }
        Ok(())
    }
}

/// Roles allowed to administer a tenant.
pub const ADMIN_ROLES: &[UserRole] = &[UserRole::Owner, UserRole::Admin];

/// Roles allowed to act on approvals and integrations.
pub const OPERATOR_ROLES: &[UserRole] = &[UserRole::Owner, UserRole::Admin, UserRole::Manager];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::tier_defaults;
    use chrono::Utc;
    use controlplane_core::types::{
        FeatureValue, SubscriptionStatus, SubscriptionTier, Tenant, User,
    };
    use uuid::Uuid;

    fn ctx(tier: SubscriptionTier, status: SubscriptionStatus, role: UserRole) -> TenantContext {
        let defaults = tier_defaults(tier);
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            slug: "acme".into(),
            idp_org_ref: None,
            namespace: "tenant_acme_0001".into(),
            tier,
            status,
            features: defaults.features,
            max_users: defaults.max_users,
            max_entities: defaults.max_entities,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let user = User::new(tenant.id, "u@acme.test", role);
        let caller = CallerIdentity {
            user_id: user.id,
            session_id: Uuid::new_v4(),
            platform_operator: false,
        };
        TenantContext::new(tenant, user, caller)
    }

    #[test]
    fn test_feature_gate_follows_tier() {
        let starter = ctx(SubscriptionTier::Starter, SubscriptionStatus::Active, UserRole::Admin);
        let err = require_feature(&starter, "what_if_analysis").unwrap_err();
        assert_eq!(err.code(), "FEATURE_NOT_AVAILABLE");

        let pro = ctx(
            SubscriptionTier::Professional,
            SubscriptionStatus::Active,
            UserRole::Admin,
        );
        assert!(require_feature(&pro, "what_if_analysis").is_ok());
    }

    #[test]
    fn test_absent_or_zero_limit_feature_is_denied() {
        let mut c = ctx(SubscriptionTier::Enterprise, SubscriptionStatus::Active, UserRole::Owner);
        assert!(require_feature(&c, "does_not_exist").is_err());

        let mut tenant = c.tenant().clone();
        tenant.features.insert("integrations".into(), FeatureValue::Limit(0));
        c = TenantContext::new(tenant, c.user().clone(), c.caller().clone());
        assert!(require_feature(&c, "integrations").is_err());
    }

    #[test]
    fn test_read_only_tenants_reject_writes() {
        let suspended = ctx(
            SubscriptionTier::Professional,
            SubscriptionStatus::Suspended,
            UserRole::Owner,
        );
        assert!(AccessPolicy::read().check(&suspended).is_ok());
        let err = AccessPolicy::write().check(&suspended).unwrap_err();
        assert_eq!(err.code(), "SUBSCRIPTION_INACTIVE");
        assert_eq!(err.status_code(), 403);

        let trial = ctx(SubscriptionTier::Starter, SubscriptionStatus::Trial, UserRole::Owner);
        assert!(prevent_read_only(&trial).is_ok());
    }

    #[test]
    fn test_role_gate() {
        let viewer = ctx(SubscriptionTier::Professional, SubscriptionStatus::Active, UserRole::Viewer);
        let policy = AccessPolicy::write().roles(OPERATOR_ROLES);
        assert_eq!(policy.check(&viewer).unwrap_err().code(), "FORBIDDEN");

        let manager = ctx(
            SubscriptionTier::Professional,
            SubscriptionStatus::Active,
            UserRole::Manager,
        );
        assert!(policy.check(&manager).is_ok());
    }

    #[test]
    fn test_platform_operator_gate() {
        let mut caller = CallerIdentity {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            platform_operator: false,
        };
        assert!(require_platform_operator(&caller).is_err());
        caller.platform_operator = true;
        assert!(require_platform_operator(&caller).is_ok());
    }
}
