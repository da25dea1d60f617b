//! Support impersonation: issues signed, short-lived tokens for a target
//! user and records every issuance in the audit log.

use chrono::{DateTime, Utc};
use controlplane_core::types::CallerIdentity;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use controlplane_platform::{
    AuditLog, AuditRecord, ImpersonationClaims, ImpersonationSigner, TenantDirectory,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationGrant {
    pub token: String,
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub struct ImpersonationService {
    directory: Arc<TenantDirectory>,
    signer: ImpersonationSigner,
    audit: Arc<AuditLog>,
}

impl ImpersonationService {
    pub fn new(
        directory: Arc<TenantDirectory>,
        signer: ImpersonationSigner,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            directory,
            signer,
            audit,
        }
    }

    pub fn issue(
        &self,
        admin: &CallerIdentity,
        user_id: Uuid,
    ) -> ControlPlaneResult<ImpersonationGrant> {
        let target = self
            .directory
            .get_user(user_id)
            .ok_or_else(|| ControlPlaneError::not_found("user", user_id))?;
        self.directory
            .get_tenant(target.tenant_id)
            .filter(|t| !t.is_deleted())
            .ok_or(ControlPlaneError::TenantNotFound)?;

        let (token, claims) = self.signer.issue(&target, admin.user_id).inspect_err(|e| {
            error!(admin = %admin.user_id, target = %user_id, error = %e, "Impersonation issuance failed");
        })?;

        self.audit.append(
            AuditRecord::new("impersonation.issued", "user", user_id)
                .tenant(claims.tenant_id)
                .actor(admin.actor())
                .metadata(json!({
                    "tokenId": claims.token_id,
                    "expiresAt": claims.expires_at,
                    "sessionId": admin.session_id,
                })),
        );
        metrics::counter!("impersonation.issued").increment(1);
        info!(
            admin = %admin.user_id,
            target = %user_id,
            tenant_id = %claims.tenant_id,
            expires_at = %claims.expires_at,
            "Impersonation token issued"
        );

        Ok(ImpersonationGrant {
            token,
            token_id: claims.token_id,
            user_id: claims.user_id,
            tenant_id: claims.tenant_id,
            expires_at: claims.expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> ControlPlaneResult<ImpersonationClaims> {
        self.signer.verify(token)
    }

    pub fn is_enabled(&self) -> bool {
        self.signer.is_configured()
    }
}
