//! Tenant lifecycle operations: create (admin or self-service signup),
//! list/get, patch, suspend, reactivate, and soft delete.

use chrono::{DateTime, Utc};
use controlplane_core::types::{
    CallerIdentity, FeatureValue, SubscriptionStatus, SubscriptionTier, Tenant, User, UserRole,
    UNLIMITED,
};
use controlplane_core::{ControlPlaneError, ControlPlaneResult, FieldIssue};
use controlplane_platform::tenancy::{apply_tier, generate_namespace, tier_defaults};
use controlplane_platform::{AuditLog, AuditRecord, NamespaceStore, TenantDirectory};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Value `delete` requires in its confirmation field.
pub const DELETE_CONFIRMATION: &str = "DELETE";

const SLUG_MIN: usize = 3;
const SLUG_MAX: usize = 48;
const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub owner_email: Option<String>,
    pub tier: Option<SubscriptionTier>,
    pub idp_org_ref: Option<String>,
}

struct ValidTenant {
    name: String,
    slug: String,
    owner_email: String,
    tier: SubscriptionTier,
}

impl CreateTenantRequest {
    fn validate(&self) -> ControlPlaneResult<ValidTenant> {
        let mut issues = Vec::new();

        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            issues.push(FieldIssue::new("name", "is required"));
        }

        let slug = self
            .slug
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_default();
        if let Err(message) = check_slug(&slug) {
            issues.push(FieldIssue::new("slug", message));
        }

        let owner_email = self.owner_email.as_deref().map(str::trim).unwrap_or_default();
        if !is_plausible_email(owner_email) {
            issues.push(FieldIssue::new("ownerEmail", "must be an email address"));
        }

        if !issues.is_empty() {
            return Err(ControlPlaneError::Validation(issues));
        }
        Ok(ValidTenant {
            name: name.to_string(),
            slug,
            owner_email: owner_email.to_lowercase(),
            tier: self.tier.unwrap_or(SubscriptionTier::Starter),
        })
    }
}

fn check_slug(slug: &str) -> Result<(), &'static str> {
    if slug.is_empty() {
        return Err("is required");
    }
    if !(SLUG_MIN..=SLUG_MAX).contains(&slug.len()) {
        return Err("must be 3 to 48 characters");
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err("may contain only a-z, 0-9 and '-'");
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err("must not start or end with '-'");
    }
    Ok(())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}

/// Partial update. Omitted fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenantRequest {
    pub name: Option<String>,
    pub tier: Option<SubscriptionTier>,
    /// Merged over the feature map after any tier change.
    pub features: Option<BTreeMap<String, FeatureValue>>,
    pub max_users: Option<i64>,
    pub max_entities: Option<i64>,
    pub idp_org_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantListQuery {
    pub status: Option<SubscriptionStatus>,
    pub tier: Option<SubscriptionTier>,
    /// Case-insensitive match on name or slug.
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPage {
    pub tenants: Vec<Tenant>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub owner: User,
}

/// Result of a status transition with before/after state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantOpResult {
    pub tenant_id: Uuid,
    pub action: String,
    pub previous_status: SubscriptionStatus,
    pub new_status: SubscriptionStatus,
    pub reason: Option<String>,
    pub performed_at: DateTime<Utc>,
}

/// Tenant lifecycle manager over the shared directory.
pub struct TenantOps {
    directory: Arc<TenantDirectory>,
    namespaces: Arc<NamespaceStore>,
    audit: Arc<AuditLog>,
    namespace_prefix: String,
}

impl TenantOps {
    pub fn new(
        directory: Arc<TenantDirectory>,
        namespaces: Arc<NamespaceStore>,
        audit: Arc<AuditLog>,
        namespace_prefix: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            namespaces,
            audit,
            namespace_prefix: namespace_prefix.into(),
        }
    }

    /// Operator-initiated creation. The tenant starts active.
    pub fn create_tenant(
        &self,
        operator: &CallerIdentity,
        request: CreateTenantRequest,
    ) -> ControlPlaneResult<ProvisionedTenant> {
        self.provision(request, SubscriptionStatus::Active, operator.actor(), "admin")
    }

    /// Self-service signup. The tenant starts in trial.
    pub fn signup(&self, request: CreateTenantRequest) -> ControlPlaneResult<ProvisionedTenant> {
        self.provision(request, SubscriptionStatus::Trial, "signup".to_string(), "signup")
    }

    fn provision(
        &self,
        request: CreateTenantRequest,
        status: SubscriptionStatus,
        actor: String,
        source: &'static str,
    ) -> ControlPlaneResult<ProvisionedTenant> {
        let valid = request.validate()?;
        let tenant_id = Uuid::new_v4();
        let namespace = generate_namespace(&self.namespace_prefix, &valid.slug);

        self.directory
            .reserve_identity(tenant_id, &valid.slug, &namespace)?;
        if let Err(e) = self.namespaces.provision(&namespace) {
            error!(tenant_id = %tenant_id, namespace = %namespace, error = %e, "Namespace provisioning failed");
            self.directory
                .release_identity(tenant_id, &valid.slug, &namespace);
            return Err(e);
        }

        let defaults = tier_defaults(valid.tier);
        let now = Utc::now();
        let tenant = Tenant {
            id: tenant_id,
            name: valid.name,
            slug: valid.slug,
            idp_org_ref: request.idp_org_ref,
            namespace,
            tier: valid.tier,
            status,
            features: defaults.features,
            max_users: defaults.max_users,
            max_entities: defaults.max_entities,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let owner = User::new(tenant.id, valid.owner_email, UserRole::Owner);

        self.directory.insert_tenant(tenant.clone());
        self.directory.insert_user(owner.clone());

        self.audit.append(
            AuditRecord::new("tenant.created", "tenant", tenant.id)
                .tenant(tenant.id)
                .actor(actor)
                .metadata(json!({
                    "slug": tenant.slug,
                    "tier": tenant.tier,
                    "status": tenant.status,
                    "namespace": tenant.namespace,
                    "ownerId": owner.id,
                    "source": source,
                })),
        );
        metrics::counter!("tenants.created", "source" => source).increment(1);
        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            tier = %tenant.tier,
            source,
            "Tenant provisioned"
        );
        Ok(ProvisionedTenant { tenant, owner })
    }

    pub fn get(&self, id: Uuid) -> ControlPlaneResult<Tenant> {
        self.directory
            .get_tenant(id)
            .ok_or(ControlPlaneError::TenantNotFound)
    }

    /// Filtered, paginated listing ordered by creation time.
    pub fn list(&self, query: &TenantListQuery) -> TenantPage {
        let search = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut tenants: Vec<Tenant> = self
            .directory
            .list_tenants()
            .into_iter()
            .filter(|t| query.include_deleted || !t.is_deleted())
            .filter(|t| query.status.map_or(true, |s| s == t.status))
            .filter(|t| query.tier.map_or(true, |tier| tier == t.tier))
            .filter(|t| {
                search.as_deref().map_or(true, |needle| {
                    t.name.to_lowercase().contains(needle) || t.slug.contains(needle)
                })
            })
            .collect();
        tenants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));

        let total = tenants.len();
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);
        let tenants = tenants
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        TenantPage {
            tenants,
            total,
            page,
            per_page,
        }
    }

    pub fn update(
        &self,
        operator: &CallerIdentity,
        id: Uuid,
        request: UpdateTenantRequest,
    ) -> ControlPlaneResult<Tenant> {
        let mut issues = Vec::new();
        if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            issues.push(FieldIssue::new("name", "must not be blank"));
        }
        for (field, value) in [("maxUsers", request.max_users), ("maxEntities", request.max_entities)] {
            if value.is_some_and(|v| v < UNLIMITED || v == 0) {
                issues.push(FieldIssue::new(field, "must be -1 (unlimited) or a positive count"));
            }
        }
        if !issues.is_empty() {
            return Err(ControlPlaneError::Validation(issues));
        }

        let mut previous_tier = None;
        let updated = self.directory.update_tenant(id, |tenant| {
            if tenant.is_deleted() {
                return Err(ControlPlaneError::conflict("tenant is deleted"));
            }
            if let Some(name) = &request.name {
                tenant.name = name.trim().to_string();
            }
            if let Some(tier) = request.tier.filter(|t| *t != tenant.tier) {
                previous_tier = Some(tenant.tier);
                apply_tier(tenant, tier);
            }
            if let Some(features) = &request.features {
                tenant
                    .features
                    .extend(features.iter().map(|(k, v)| (k.clone(), *v)));
            }
            if let Some(max_users) = request.max_users {
                tenant.max_users = max_users;
            }
            if let Some(max_entities) = request.max_entities {
                tenant.max_entities = max_entities;
            }
            if let Some(org) = &request.idp_org_ref {
                tenant.idp_org_ref = Some(org.clone());
            }
            Ok(())
        })?;

        self.audit.append(
            AuditRecord::new("tenant.updated", "tenant", id)
                .tenant(id)
                .actor(operator.actor())
                .metadata(json!({
                    "name": request.name,
                    "previousTier": previous_tier,
                    "tier": updated.tier,
                    "features": request.features,
                    "maxUsers": request.max_users,
                    "maxEntities": request.max_entities,
                })),
        );
        info!(tenant_id = %id, "Tenant updated");
        Ok(updated)
    }

    /// Suspend a tenant: reads stay allowed, writes are blocked. Data is kept.
    pub fn suspend(
        &self,
        operator: &CallerIdentity,
        id: Uuid,
        reason: &str,
    ) -> ControlPlaneResult<TenantOpResult> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ControlPlaneError::validation("reason", "is required"));
        }
        self.transition(operator, id, "suspend", Some(reason), |tenant| {
            match tenant.status {
                SubscriptionStatus::Suspended => {
                    Err(ControlPlaneError::conflict("tenant is already suspended"))
                }
                SubscriptionStatus::Cancelled => {
                    Err(ControlPlaneError::conflict("cannot suspend a cancelled tenant"))
                }
                _ => Ok(SubscriptionStatus::Suspended),
            }
        })
    }

    /// Reactivate a suspended or cancelled tenant.
    pub fn reactivate(
        &self,
        operator: &CallerIdentity,
        id: Uuid,
        reason: Option<&str>,
    ) -> ControlPlaneResult<TenantOpResult> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.transition(operator, id, "reactivate", reason, |tenant| {
            match tenant.status {
                SubscriptionStatus::Suspended | SubscriptionStatus::Cancelled => {
                    Ok(SubscriptionStatus::Active)
                }
                other => Err(ControlPlaneError::conflict(format!(
                    "tenant is {other}, cannot reactivate"
                ))),
            }
        })
    }

    fn transition<F>(
        &self,
        operator: &CallerIdentity,
        id: Uuid,
        action: &'static str,
        reason: Option<&str>,
        next: F,
    ) -> ControlPlaneResult<TenantOpResult>
    where
        F: FnOnce(&Tenant) -> ControlPlaneResult<SubscriptionStatus>,
    {
        let mut previous_status = None;
        let updated = self
            .directory
            .update_tenant(id, |tenant| {
                if tenant.is_deleted() {
                    return Err(ControlPlaneError::conflict("tenant is deleted"));
                }
                let status = next(tenant)?;
                previous_status = Some(tenant.status);
                tenant.status = status;
                Ok(())
            })
            .map_err(|e| match e {
                ControlPlaneError::NotFound { .. } => ControlPlaneError::TenantNotFound,
                other => other,
            })?;
        let previous_status = previous_status.unwrap_or(updated.status);

        self.audit.append(
            AuditRecord::new(format!("tenant.{action}"), "tenant", id)
                .tenant(id)
                .actor(operator.actor())
                .metadata(json!({
                    "from": previous_status,
                    "to": updated.status,
                    "reason": reason,
                })),
        );
        metrics::counter!("tenants.lifecycle", "action" => action).increment(1);
        info!(tenant_id = %id, action, from = %previous_status, to = %updated.status, "Tenant status changed");

        Ok(TenantOpResult {
            tenant_id: id,
            action: action.to_string(),
            previous_status,
            new_status: updated.status,
            reason: reason.map(str::to_string),
            performed_at: updated.updated_at,
        })
    }

    /// Soft delete: sets `deleted_at` and cancels the subscription. Slug,
    /// namespace and data stay reserved.
    pub fn delete(
        &self,
        operator: &CallerIdentity,
        id: Uuid,
        confirm: Option<&str>,
    ) -> ControlPlaneResult<Tenant> {
        if confirm != Some(DELETE_CONFIRMATION) {
            return Err(ControlPlaneError::validation(
                "confirm",
                format!("must equal \"{DELETE_CONFIRMATION}\""),
            ));
        }

        let mut previous_status = None;
        let deleted = self
            .directory
            .update_tenant(id, |tenant| {
                if tenant.is_deleted() {
                    return Err(ControlPlaneError::conflict("tenant is already deleted"));
                }
                previous_status = Some(tenant.status);
                tenant.deleted_at = Some(Utc::now());
                tenant.status = SubscriptionStatus::Cancelled;
                Ok(())
            })
            .map_err(|e| match e {
                ControlPlaneError::NotFound { .. } => ControlPlaneError::TenantNotFound,
                other => other,
            })?;

        self.audit.append(
            AuditRecord::new("tenant.deleted", "tenant", id)
                .tenant(id)
                .actor(operator.actor())
                .metadata(json!({ "from": previous_status, "soft": true })),
        );
        metrics::counter!("tenants.lifecycle", "action" => "delete").increment(1);
        info!(tenant_id = %id, "Tenant soft-deleted");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controlplane_platform::AuditQuery;

    fn setup() -> (TenantOps, Arc<TenantDirectory>, Arc<NamespaceStore>, Arc<AuditLog>) {
        let directory = Arc::new(TenantDirectory::new());
        let namespaces = Arc::new(NamespaceStore::new());
        let audit = Arc::new(AuditLog::new());
        let ops = TenantOps::new(directory.clone(), namespaces.clone(), audit.clone(), "tenant_");
        (ops, directory, namespaces, audit)
    }

    fn operator() -> CallerIdentity {
        CallerIdentity {
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            platform_operator: true,
        }
    }

    fn request(name: &str, slug: &str, tier: SubscriptionTier) -> CreateTenantRequest {
        CreateTenantRequest {
            name: Some(name.into()),
            slug: Some(slug.into()),
            owner_email: Some(format!("owner@{slug}.test")),
            tier: Some(tier),
            idp_org_ref: None,
        }
    }

    #[test]
    fn test_create_applies_tier_defaults_and_provisions() {
        let (ops, directory, namespaces, audit) = setup();
        let created = ops
            .create_tenant(&operator(), request("Acme", "acme", SubscriptionTier::Professional))
            .unwrap();

        let tenant = &created.tenant;
        assert_eq!(tenant.status, SubscriptionStatus::Active);
        assert_eq!(tenant.max_users, 25);
        assert!(tenant.has_feature("what_if_analysis"));
        assert!(tenant.namespace.starts_with("tenant_acme_"));
        assert!(namespaces.is_provisioned(&tenant.namespace));
        assert_eq!(created.owner.role, UserRole::Owner);
        assert_eq!(directory.users_for_tenant(tenant.id).len(), 1);
        assert_eq!(audit.for_resource("tenant", &tenant.id.to_string()).len(), 1);
    }

    #[test]
    fn test_duplicate_slug_is_case_insensitive_conflict() {
        let (ops, directory, namespaces, _) = setup();
        ops.create_tenant(&operator(), request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap();

        let err = ops
            .create_tenant(&operator(), request("Acme Two", "ACME", SubscriptionTier::Starter))
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(directory.tenant_count(), 1);
        assert_eq!(namespaces.partition_count(), 1);
    }

    #[test]
    fn test_create_validation_collects_field_issues() {
        let (ops, directory, _, _) = setup();
        let err = ops
            .create_tenant(
                &operator(),
                CreateTenantRequest {
                    name: Some(" ".into()),
                    slug: Some("-bad slug".into()),
                    owner_email: Some("nobody".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        match err {
            ControlPlaneError::Validation(issues) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "slug", "ownerEmail"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(directory.tenant_count(), 0);
    }

    #[test]
    fn test_signup_starts_in_trial() {
        let (ops, _, _, _) = setup();
        let created = ops.signup(request("Initech", "initech", SubscriptionTier::Starter)).unwrap();
        assert_eq!(created.tenant.status, SubscriptionStatus::Trial);
    }

    #[test]
    fn test_suspend_and_reactivate() {
        let (ops, _, _, _) = setup();
        let op = operator();
        let tenant = ops
            .create_tenant(&op, request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap()
            .tenant;

        assert!(ops.suspend(&op, tenant.id, "  ").is_err());
        let result = ops.suspend(&op, tenant.id, "Non-payment").unwrap();
        assert_eq!(result.previous_status, SubscriptionStatus::Active);
        assert_eq!(result.new_status, SubscriptionStatus::Suspended);
        assert_eq!(
            ops.suspend(&op, tenant.id, "again").unwrap_err().code(),
            "CONFLICT"
        );

        let result = ops.reactivate(&op, tenant.id, Some("Payment received")).unwrap();
        assert_eq!(result.new_status, SubscriptionStatus::Active);
        assert_eq!(
            ops.reactivate(&op, tenant.id, None).unwrap_err().code(),
            "CONFLICT"
        );
    }

    #[test]
    fn test_delete_requires_confirmation() {
        let (ops, _, _, audit) = setup();
        let op = operator();
        let tenant = ops
            .create_tenant(&op, request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap()
            .tenant;

        for confirm in [None, Some("delete"), Some("yes")] {
            let err = ops.delete(&op, tenant.id, confirm).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        let unchanged = ops.get(tenant.id).unwrap();
        assert!(unchanged.deleted_at.is_none());
        assert_eq!(unchanged.status, SubscriptionStatus::Active);

        let deleted = ops.delete(&op, tenant.id, Some("DELETE")).unwrap();
        assert!(deleted.deleted_at.is_some());
        assert_eq!(deleted.status, SubscriptionStatus::Cancelled);
        assert_eq!(
            audit
                .query(&AuditQuery {
                    action: Some("tenant.deleted".into()),
                    ..Default::default()
                })
                .len(),
            1
        );

        // Deleted tenants are frozen and their slug stays reserved.
        assert!(ops.reactivate(&op, tenant.id, None).is_err());
        assert!(ops
            .create_tenant(&op, request("Acme Again", "acme", SubscriptionTier::Starter))
            .is_err());
    }

    #[test]
    fn test_list_filters_and_paginates() {
        let (ops, _, _, _) = setup();
        let op = operator();
        for (name, slug, tier) in [
            ("Acme", "acme", SubscriptionTier::Professional),
            ("Globex", "globex", SubscriptionTier::Enterprise),
            ("Initech", "initech", SubscriptionTier::Starter),
            ("Acme Labs", "acme-labs", SubscriptionTier::Starter),
        ] {
            ops.create_tenant(&op, request(name, slug, tier)).unwrap();
        }
        let globex = ops
            .list(&TenantListQuery {
                search: Some("GLOB".into()),
                ..Default::default()
            })
            .tenants;
        ops.delete(&op, globex[0].id, Some(DELETE_CONFIRMATION)).unwrap();

        let all = ops.list(&TenantListQuery::default());
        assert_eq!(all.total, 3);

        let acme = ops.list(&TenantListQuery {
            search: Some("acme".into()),
            ..Default::default()
        });
        assert_eq!(acme.total, 2);

        let starters = ops.list(&TenantListQuery {
            tier: Some(SubscriptionTier::Starter),
            per_page: Some(1),
            page: Some(2),
            ..Default::default()
        });
        assert_eq!(starters.total, 2);
        assert_eq!(starters.tenants.len(), 1);
        assert_eq!(starters.tenants[0].slug, "acme-labs");

        let with_deleted = ops.list(&TenantListQuery {
            include_deleted: true,
            ..Default::default()
        });
        assert_eq!(with_deleted.total, 4);
    }

    #[test]
    fn test_tier_change_reapplies_defaults_and_keeps_overrides() {
        let (ops, _, _, _) = setup();
        let op = operator();
        let tenant = ops
            .create_tenant(&op, request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap()
            .tenant;

        let mut overrides = BTreeMap::new();
        overrides.insert("sso".to_string(), FeatureValue::Enabled(true));
        let updated = ops
            .update(
                &op,
                tenant.id,
                UpdateTenantRequest {
                    tier: Some(SubscriptionTier::Professional),
                    features: Some(overrides),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.tier, SubscriptionTier::Professional);
        assert_eq!(updated.max_users, 25);
        assert!(updated.has_feature("sso"));
        assert!(updated.has_feature("audit_export"));

        let err = ops
            .update(
                &op,
                tenant.id,
                UpdateTenantRequest {
                    max_users: Some(-5),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_tier_change_keeps_previously_applied_overrides() {
        let (ops, directory, _, _) = setup();
        let op = operator();
        let tenant = ops
            .create_tenant(&op, request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap()
            .tenant;

        // As an approved feature-flag change would leave it.
        directory
            .update_tenant(tenant.id, |t| {
                t.features.insert("sso".into(), FeatureValue::Enabled(true));
                Ok(())
            })
            .unwrap();

        let updated = ops
            .update(
                &op,
                tenant.id,
                UpdateTenantRequest {
                    tier: Some(SubscriptionTier::Professional),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.tier, SubscriptionTier::Professional);
        assert!(updated.has_feature("sso"));
        assert!(updated.has_feature("what_if_analysis"));
        assert_eq!(updated.max_users, 25);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let (ops, _, _, _) = setup();
        let op = operator();
        let tenant = ops
            .create_tenant(&op, request("Acme", "acme", SubscriptionTier::Starter))
            .unwrap()
            .tenant;

        let err = ops
            .update(
                &op,
                tenant.id,
                UpdateTenantRequest {
                    max_users: Some(0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        match err {
            ControlPlaneError::Validation(issues) => assert_eq!(issues[0].field, "maxUsers"),
            other => panic!("unexpected error {other:?}"),
        }

        let updated = ops
            .update(
                &op,
                tenant.id,
                UpdateTenantRequest {
                    max_entities: Some(UNLIMITED),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.max_entities, UNLIMITED);
    }
}
