//! Per-tenant isolated storage partitions.
//!
//! A partition is addressed only through a [`TenantContext`]; there is no
//! API that takes a raw namespace for reads or writes. Partitions are
//! created once at tenant provisioning and survive soft deletion.

use controlplane_core::types::TenantContext;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{error, info};

type Collection = BTreeMap<String, serde_json::Value>;

#[derive(Default)]
struct Partition {
    collections: RwLock<BTreeMap<String, Collection>>,
}

/// In-memory stand-in for one-schema-per-tenant storage.
pub struct NamespaceStore {
    partitions: DashMap<String, Partition>,
}

impl Default for NamespaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceStore {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    /// Create an empty partition. Fails if the namespace already exists.
    pub fn provision(&self, namespace: &str) -> ControlPlaneResult<()> {
        match self.partitions.entry(namespace.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ControlPlaneError::conflict(
                format!("namespace `{namespace}` is already provisioned"),
            )),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Partition::default());
                info!(namespace, "Namespace provisioned");
                Ok(())
            }
        }
    }

    pub fn is_provisioned(&self, namespace: &str) -> bool {
        self.partitions.contains_key(namespace)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    fn with_partition<T>(
        &self,
        ctx: &TenantContext,
        f: impl FnOnce(&Partition) -> T,
    ) -> ControlPlaneResult<T> {
        match self.partitions.get(ctx.namespace()) {
            Some(partition) => Ok(f(partition.value())),
            None => {
                error!(
                    tenant_id = %ctx.tenant_id(),
                    namespace = ctx.namespace(),
                    request_id = %ctx.request_id(),
                    "Tenant namespace is not provisioned"
                );
                Err(ControlPlaneError::internal(format!(
                    "namespace `{}` is not provisioned",
                    ctx.namespace()
                )))
            }
        }
    }

    /// Insert or replace a record. Returns the previous value, if any.
    pub fn put(
        &self,
        ctx: &TenantContext,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> ControlPlaneResult<Option<serde_json::Value>> {
        self.with_partition(ctx, |p| {
            p.collections
                .write()
                .entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), value)
        })
    }

    pub fn get(
        &self,
        ctx: &TenantContext,
        collection: &str,
        key: &str,
    ) -> ControlPlaneResult<Option<serde_json::Value>> {
        self.with_partition(ctx, |p| {
            p.collections
                .read()
                .get(collection)
                .and_then(|c| c.get(key).cloned())
        })
    }

    pub fn remove(
        &self,
        ctx: &TenantContext,
        collection: &str,
        key: &str,
    ) -> ControlPlaneResult<Option<serde_json::Value>> {
        self.with_partition(ctx, |p| {
            p.collections
                .write()
                .get_mut(collection)
                .and_then(|c| c.remove(key))
        })
    }

    /// Key-ordered records in a collection.
    pub fn list(
        &self,
        ctx: &TenantContext,
        collection: &str,
    ) -> ControlPlaneResult<Vec<(String, serde_json::Value)>> {
        self.with_partition(ctx, |p| {
            p.collections
                .read()
                .get(collection)
                .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        })
    }

    pub fn count(&self, ctx: &TenantContext, collection: &str) -> ControlPlaneResult<usize> {
        self.with_partition(ctx, |p| {
            p.collections.read().get(collection).map_or(0, |c| c.len())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use controlplane_core::types::{
        CallerIdentity, SubscriptionStatus, SubscriptionTier, Tenant, User, UserRole,
    };
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx_for(namespace: &str) -> TenantContext {
        let now = Utc::now();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: namespace.into(),
            slug: namespace.into(),
            idp_org_ref: None,
            namespace: namespace.into(),
            tier: SubscriptionTier::Starter,
            status: SubscriptionStatus::Active,
            features: BTreeMap::new(),
            max_users: 5,
            max_entities: 1000,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let user = User::new(tenant.id, "u@test", UserRole::Owner);
        let caller = CallerIdentity {
            user_id: user.id,
            session_id: Uuid::new_v4(),
            platform_operator: false,
        };
        TenantContext::new(tenant, user, caller)
    }

    #[test]
    fn test_provision_is_unique() {
        let store = NamespaceStore::new();
        store.provision("tenant_a").unwrap();
        assert!(store.provision("tenant_a").is_err());
        assert!(store.is_provisioned("tenant_a"));
    }

    #[test]
    fn test_unprovisioned_namespace_fails() {
        let store = NamespaceStore::new();
        let ctx = ctx_for("tenant_missing");
        assert!(store.put(&ctx, "config", "k", json!(1)).is_err());
    }

    #[test]
    fn test_put_get_remove() {
        let store = NamespaceStore::new();
        store.provision("tenant_a").unwrap();
        let ctx = ctx_for("tenant_a");

        assert!(store.put(&ctx, "config", "theme", json!("dark")).unwrap().is_none());
        assert_eq!(store.get(&ctx, "config", "theme").unwrap(), Some(json!("dark")));
        assert_eq!(store.count(&ctx, "config").unwrap(), 1);
        assert_eq!(store.remove(&ctx, "config", "theme").unwrap(), Some(json!("dark")));
        assert!(store.list(&ctx, "config").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_tenants_never_see_each_other() {
        let store = Arc::new(NamespaceStore::new());
        store.provision("tenant_a").unwrap();
        store.provision("tenant_b").unwrap();

        let mut handles = Vec::new();
        for ns in ["tenant_a", "tenant_b"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let ctx = ctx_for(ns);
                for i in 0..200 {
                    store
                        .put(&ctx, "entities", &format!("{ns}-{i}"), json!({ "owner": ns }))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        for ns in ["tenant_a", "tenant_b"] {
            let rows = store.list(&ctx_for(ns), "entities").unwrap();
            assert_eq!(rows.len(), 200);
            assert!(rows.iter().all(|(k, v)| k.starts_with(ns) && v["owner"] == ns));
        }
    }
}
