//! Multi-tenancy: the shared tenant/user directory, tier defaults, storage
//! namespace naming, and the resolver that turns a caller into a tenant
//! context.

use chrono::Utc;
use controlplane_core::types::{
    CallerIdentity, FeatureValue, SubscriptionTier, Tenant, TenantContext, User, UNLIMITED,
};
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Longest namespace identifier accepted (Postgres identifier limit).
pub const MAX_NAMESPACE_LEN: usize = 63;

/// Capability names carried in tenant feature maps.
pub mod features {
    pub const BASIC_REPORTING: &str = "basic_reporting";
    pub const INTEGRATIONS: &str = "integrations";
    pub const WHAT_IF_ANALYSIS: &str = "what_if_analysis";
    pub const AUDIT_EXPORT: &str = "audit_export";
    pub const APPROVAL_WORKFLOWS: &str = "approval_workflows";
    pub const SSO: &str = "sso";
}

/// Feature map and limits applied when a tenant lands on a tier.
#[derive(Debug, Clone)]
pub struct TierDefaults {
    pub features: BTreeMap<String, FeatureValue>,
    pub max_users: i64,
    pub max_entities: i64,
}

/// Return the default settings for a given subscription tier.
pub fn tier_defaults(tier: SubscriptionTier) -> TierDefaults {
    let mut features = BTreeMap::new();
    let mut set = |name: &str, value: FeatureValue| {
        features.insert(name.to_string(), value);
    };

    match tier {
        SubscriptionTier::Starter => {
            set(features::BASIC_REPORTING, FeatureValue::Enabled(true));
            set(features::INTEGRATIONS, FeatureValue::Limit(2));
            set(features::APPROVAL_WORKFLOWS, FeatureValue::Enabled(true));
            set(features::WHAT_IF_ANALYSIS, FeatureValue::Enabled(false));
            set(features::AUDIT_EXPORT, FeatureValue::Enabled(false));
            set(features::SSO, FeatureValue::Enabled(false));
            TierDefaults {
                features,
                max_users: 5,
                max_entities: 1_000,
            }
        }
        SubscriptionTier::Professional => {
            set(features::BASIC_REPORTING, FeatureValue::Enabled(true));
            set(features::INTEGRATIONS, FeatureValue::Limit(10));
            set(features::APPROVAL_WORKFLOWS, FeatureValue::Enabled(true));
            set(features::WHAT_IF_ANALYSIS, FeatureValue::Enabled(true));
            set(features::AUDIT_EXPORT, FeatureValue::Enabled(true));
            set(features::SSO, FeatureValue::Enabled(false));
            TierDefaults {
                features,
                max_users: 25,
                max_entities: 10_000,
            }
        }
        SubscriptionTier::Enterprise => {
            set(features::BASIC_REPORTING, FeatureValue::Enabled(true));
            set(features::INTEGRATIONS, FeatureValue::Limit(UNLIMITED));
            set(features::APPROVAL_WORKFLOWS, FeatureValue::Enabled(true));
            set(features::WHAT_IF_ANALYSIS, FeatureValue::Enabled(true));
            set(features::AUDIT_EXPORT, FeatureValue::Enabled(true));
            set(features::SSO, FeatureValue::Enabled(true));
            TierDefaults {
                features,
                max_users: UNLIMITED,
                max_entities: UNLIMITED,
            }
        }
    }
}

/// Feature entries that differ from the defaults of the tenant's current
/// tier, however they were set (PATCH body or an applied approval).
pub fn feature_overrides(tenant: &Tenant) -> BTreeMap<String, FeatureValue> {
    let defaults = tier_defaults(tenant.tier).features;
    tenant
        .features
        .iter()
        .filter(|(name, value)| defaults.get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), *value))
        .collect()
}

/// Move a tenant to `tier`: limits and features reset to the tier's
/// defaults, then existing overrides are laid back on top.
pub fn apply_tier(tenant: &mut Tenant, tier: SubscriptionTier) {
    let overrides = feature_overrides(tenant);
    let defaults = tier_defaults(tier);
    tenant.tier = tier;
    tenant.features = defaults.features;
    tenant.features.extend(overrides);
    tenant.max_users = defaults.max_users;
    tenant.max_entities = defaults.max_entities;
}

// ─── Namespace naming ───────────────────────────────────────────────────

/// Build a namespace identifier from a slug plus a random uniqueness token.
pub fn generate_namespace(prefix: &str, slug: &str) -> String {
    let token: u32 = rand::thread_rng().gen();
    let budget = MAX_NAMESPACE_LEN.saturating_sub(prefix.len() + 9);
    let stem: String = slug
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(budget)
        .collect();
    format!("{prefix}{stem}_{token:08x}")
}

/// Allow-list check for namespace identifiers: the configured prefix, then
/// only `[a-z0-9_]`, within the identifier length limit.
pub fn is_valid_namespace(namespace: &str, prefix: &str) -> bool {
    if namespace.len() > MAX_NAMESPACE_LEN || !namespace.starts_with(prefix) {
        return false;
    }
    let rest = &namespace[prefix.len()..];
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ─── Directory ──────────────────────────────────────────────────────────

/// Shared-namespace store of tenants and users, backed by DashMap.
///
/// Slugs (case-insensitive) and namespaces are reserved forever once issued;
/// soft-deleted tenants keep theirs.
pub struct TenantDirectory {
    tenants: DashMap<Uuid, Tenant>,
    slugs: DashMap<String, Uuid>,
    namespaces: DashMap<String, Uuid>,
    users: DashMap<Uuid, User>,
}

impl Default for TenantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self {
            tenants: DashMap::new(),
            slugs: DashMap::new(),
            namespaces: DashMap::new(),
            users: DashMap::new(),
        }
    }

    /// Atomically claim a slug and namespace for a tenant id.
    pub fn reserve_identity(
        &self,
        tenant_id: Uuid,
        slug: &str,
        namespace: &str,
    ) -> ControlPlaneResult<()> {
        let slug_key = slug.to_lowercase();
        match self.slugs.entry(slug_key.clone()) {
            Entry::Occupied(_) => {
                return Err(ControlPlaneError::conflict(format!(
                    "slug `{slug}` is already taken"
                )))
            }
            Entry::Vacant(v) => {
                v.insert(tenant_id);
            }
        }
        match self.namespaces.entry(namespace.to_string()) {
            Entry::Occupied(_) => {
                self.slugs.remove(&slug_key);
                Err(ControlPlaneError::conflict(format!(
                    "namespace `{namespace}` is already assigned"
                )))
            }
            Entry::Vacant(v) => {
                v.insert(tenant_id);
                Ok(())
            }
        }
    }

    /// Undo a reservation whose tenant was never created.
    pub fn release_identity(&self, tenant_id: Uuid, slug: &str, namespace: &str) {
        if self.tenants.contains_key(&tenant_id) {
            return;
        }
        self.slugs.remove_if(&slug.to_lowercase(), |_, id| *id == tenant_id);
        self.namespaces.remove_if(namespace, |_, id| *id == tenant_id);
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.slugs.contains_key(&slug.to_lowercase())
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant stored");
        self.tenants.insert(tenant.id, tenant);
    }

    pub fn get_tenant(&self, id: Uuid) -> Option<Tenant> {
        self.tenants.get(&id).map(|e| e.value().clone())
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<Tenant> {
        let id = *self.slugs.get(&slug.to_lowercase())?;
        self.get_tenant(id)
    }

    pub fn list_tenants(&self) -> Vec<Tenant> {
        self.tenants.iter().map(|e| e.value().clone()).collect()
    }

    /// Mutate a tenant under its entry lock. The closure may refuse the
    /// change by returning an error, in which case nothing is written.
    pub fn update_tenant<F>(&self, id: Uuid, mutate: F) -> ControlPlaneResult<Tenant>
    where
        F: FnOnce(&mut Tenant) -> ControlPlaneResult<()>,
    {
        let mut entry = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| ControlPlaneError::not_found("tenant", id))?;
        let mut draft = entry.value().clone();
        mutate(&mut draft)?;
        draft.updated_at = Utc::now();
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|e| e.value().clone())
    }

    pub fn users_for_tenant(&self, tenant_id: Uuid) -> Vec<User> {
        self.users
            .iter()
            .filter(|e| e.value().tenant_id == tenant_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn update_user<F, T>(&self, id: Uuid, mutate: F) -> ControlPlaneResult<T>
    where
        F: FnOnce(&mut User) -> ControlPlaneResult<T>,
    {
        let mut entry = self
            .users
            .get_mut(&id)
            .ok_or_else(|| ControlPlaneError::not_found("user", id))?;
        mutate(entry.value_mut())
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }
}

// ─── Resolver ───────────────────────────────────────────────────────────

/// Resolves an authenticated caller to its tenant and storage namespace.
///
/// Performs no writes. Fails closed: a deleted tenant is `TenantNotFound`
/// and a namespace outside the allow-list is refused outright.
pub struct TenantResolver {
    directory: Arc<TenantDirectory>,
    namespace_prefix: String,
}

impl TenantResolver {
    pub fn new(directory: Arc<TenantDirectory>, namespace_prefix: impl Into<String>) -> Self {
        Self {
            directory,
            namespace_prefix: namespace_prefix.into(),
        }
    }

    pub fn resolve(&self, caller: &CallerIdentity) -> ControlPlaneResult<TenantContext> {
        let user = self
            .directory
            .get_user(caller.user_id)
            .ok_or_else(|| ControlPlaneError::Unauthorized("unknown caller".into()))?;

        let tenant = self
            .directory
            .get_tenant(user.tenant_id)
            .filter(|t| !t.is_deleted())
            .ok_or(ControlPlaneError::TenantNotFound)?;

        if !is_valid_namespace(&tenant.namespace, &self.namespace_prefix) {
            error!(
                tenant_id = %tenant.id,
                namespace = %tenant.namespace,
                "Tenant namespace failed allow-list validation"
            );
            metrics::counter!("tenancy.namespace_rejections").increment(1);
            return Err(ControlPlaneError::Forbidden(
                "tenant storage namespace is not routable".into(),
            ));
        }

        Ok(TenantContext::new(tenant, user, caller.clone()))
    }
}
