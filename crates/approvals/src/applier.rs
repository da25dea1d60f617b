//! Applying an approved request's `requestedChanges` to tenant state.

use async_trait::async_trait;
use chrono::Utc;
use controlplane_core::types::{ApprovalType, FeatureValue, TenantContext, UserRole};
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use controlplane_platform::{NamespaceStore, TenantDirectory};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::model::ApprovalRequest;

/// Namespace collection recording every applied change, keyed by approval id.
pub const APPLIED_CHANGES: &str = "applied_changes";
/// Namespace collection holding tenant configuration values.
pub const CONFIG: &str = "config";

/// Applies a request's changes. Must either fully apply or return an error
/// having changed nothing.
#[async_trait]
pub trait ChangeApplier: Send + Sync {
    async fn apply(&self, ctx: &TenantContext, request: &ApprovalRequest) -> ControlPlaneResult<Value>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureChange {
    feature: Option<String>,
    value: Option<FeatureValue>,
    #[serde(default)]
    features: BTreeMap<String, FeatureValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigChange {
    key: Option<String>,
    value: Option<Value>,
    #[serde(default)]
    settings: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestructiveChange {
    collection: String,
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessGrant {
    user_id: Uuid,
    role: UserRole,
}

fn parse<T: for<'de> Deserialize<'de>>(changes: &Value) -> ControlPlaneResult<T> {
    serde_json::from_value(changes.clone())
        .map_err(|e| ControlPlaneError::validation("requestedChanges", e.to_string()))
}

/// Applies changes against the tenant directory and the tenant's namespace.
pub struct TenantChangeApplier {
    directory: Arc<TenantDirectory>,
    namespaces: Arc<NamespaceStore>,
}

impl TenantChangeApplier {
    pub fn new(directory: Arc<TenantDirectory>, namespaces: Arc<NamespaceStore>) -> Self {
        Self {
            directory,
            namespaces,
        }
    }

    fn apply_features(&self, ctx: &TenantContext, changes: &Value) -> ControlPlaneResult<Value> {
        let change: FeatureChange = parse(changes)?;
        let mut updates = change.features;
        if let (Some(feature), Some(value)) = (change.feature, change.value) {
            updates.insert(feature, value);
        }
        if updates.is_empty() {
            return Err(ControlPlaneError::validation(
                "requestedChanges",
                "expected `feature`/`value` or a `features` map",
            ));
        }
        let applied = json!(updates);
        self.directory.update_tenant(ctx.tenant_id(), |tenant| {
            tenant.features.extend(updates);
            Ok(())
        })?;
        Ok(json!({ "features": applied }))
    }

    fn apply_config(&self, ctx: &TenantContext, changes: &Value) -> ControlPlaneResult<Value> {
        let change: ConfigChange = parse(changes)?;
        let mut settings = change.settings;
        if let (Some(key), Some(value)) = (change.key, change.value) {
            settings.insert(key, value);
        }
        if settings.is_empty() {
            return Err(ControlPlaneError::validation(
                "requestedChanges",
                "expected `key`/`value` or a `settings` map",
            ));
        }
        for (key, value) in &settings {
            self.namespaces.put(ctx, CONFIG, key, value.clone())?;
        }
        Ok(json!({ "settings": settings }))
    }

    fn apply_destructive(&self, ctx: &TenantContext, changes: &Value) -> ControlPlaneResult<Value> {
        let change: DestructiveChange = parse(changes)?;
        if change.collection == APPLIED_CHANGES {
            return Err(ControlPlaneError::Forbidden(
                "the applied-changes ledger cannot be modified".into(),
            ));
        }
        self.namespaces
            .remove(ctx, &change.collection, &change.key)?
            .ok_or_else(|| {
                ControlPlaneError::not_found("record", format!("{}/{}", change.collection, change.key))
            })?;
        Ok(json!({ "deleted": { "collection": change.collection, "key": change.key } }))
    }

    fn apply_access_grant(&self, ctx: &TenantContext, changes: &Value) -> ControlPlaneResult<Value> {
        let grant: AccessGrant = parse(changes)?;
        let tenant_id = ctx.tenant_id();
        self.directory.update_user(grant.user_id, |user| {
            if user.tenant_id != tenant_id {
                return Err(ControlPlaneError::not_found("user", grant.user_id));
            }
            user.role = grant.role;
            Ok(())
        })?;
        Ok(json!({ "userId": grant.user_id, "role": grant.role }))
    }
}

#[async_trait]
impl ChangeApplier for TenantChangeApplier {
    async fn apply(&self, ctx: &TenantContext, request: &ApprovalRequest) -> ControlPlaneResult<Value> {
        let key = request.id.to_string();
        if let Some(previous) = self.namespaces.get(ctx, APPLIED_CHANGES, &key)? {
            return Ok(previous["result"].clone());
        }

        let changes = &request.requested_changes;
        let result = match request.approval_type {
            ApprovalType::FeatureFlag => self.apply_features(ctx, changes)?,
            ApprovalType::ConfigChange => self.apply_config(ctx, changes)?,
            ApprovalType::DestructiveOp => self.apply_destructive(ctx, changes)?,
            ApprovalType::AccessGrant => self.apply_access_grant(ctx, changes)?,
            // Integration settings are owned by the orchestrator; record only.
            ApprovalType::IntegrationChange => json!({ "recorded": changes }),
        };

        self.namespaces.put(
            ctx,
            APPLIED_CHANGES,
            &key,
            json!({
                "type": request.approval_type,
                "changes": changes,
                "result": result,
                "appliedAt": Utc::now(),
            }),
        )?;
        info!(
            tenant_id = %ctx.tenant_id(),
            approval_id = %request.id,
            approval_type = request.approval_type.as_str(),
            "Approved changes applied"
        );
        Ok(result)
    }
}
