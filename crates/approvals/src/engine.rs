//! Approval state machine.
//!
//! ```text
//! PENDING ──(auto rule)──▶ APPROVED
//! PENDING ─▶ MFA_REQUIRED ─▶ APPROVED
//! PENDING | MFA_REQUIRED ─▶ REJECTED
//! ```
//!
//! Every record sits behind its own async mutex, so transitions on one
//! request are serialized while different requests proceed in parallel.
//! Changes are applied and the audit entry written while the lock is held;
//! the status only moves once both have happened.

use chrono::Utc;
use controlplane_core::types::TenantContext;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use controlplane_platform::{AuditLog, AuditRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::applier::ChangeApplier;
use crate::model::{
    ApprovalFilter, ApprovalRequest, ApprovalStatus, NewApprovalRequest, StateTransition,
    ValidatedRequest,
};
use crate::policy::AutoApprovalPolicy;

const AUTO_APPROVER: &str = "policy:auto-approve";

struct ApprovalRecord {
    request: ApprovalRequest,
    history: Vec<StateTransition>,
    /// False until `create` has fully succeeded; uncommitted records are
    /// invisible to every read and transition.
    committed: bool,
}

type SharedRecord = Arc<Mutex<ApprovalRecord>>;

pub struct ApprovalEngine {
    records: DashMap<Uuid, SharedRecord>,
    /// (tenant, idempotency key) -> approval id
    idempotency: DashMap<(Uuid, String), Uuid>,
    policy: AutoApprovalPolicy,
    applier: Arc<dyn ChangeApplier>,
    audit: Arc<AuditLog>,
}

impl ApprovalEngine {
    pub fn new(
        policy: AutoApprovalPolicy,
        applier: Arc<dyn ChangeApplier>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            records: DashMap::new(),
            idempotency: DashMap::new(),
            policy,
            applier,
            audit,
        }
    }

    /// Validate and record a new request.
    ///
    /// With an idempotency key, a retry returns the original request and
    /// never re-applies its changes.
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: NewApprovalRequest,
        idempotency_key: Option<String>,
    ) -> ControlPlaneResult<ApprovalRequest> {
        let valid = input.validate()?;
        let key = idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let now = Utc::now();
        let id = Uuid::new_v4();
        let request = ApprovalRequest {
            id,
            tenant_id: ctx.tenant_id(),
            approval_type: valid.approval_type,
            category: valid.category,
            priority: valid.priority,
            title: valid.title.clone(),
            description: valid.description.clone(),
            requested_changes: valid.requested_changes.clone(),
            rationale: valid.rationale.clone(),
            requester_id: ctx.user_id(),
            status: ApprovalStatus::Pending,
            approver_id: None,
            resolution_reason: None,
            created_at: now,
            resolved_at: None,
        };
        let record = Arc::new(Mutex::new(ApprovalRecord {
            request,
            history: vec![StateTransition {
                from: None,
                to: ApprovalStatus::Pending,
                actor: ctx.caller().actor(),
                reason: None,
                at: now,
            }],
            committed: false,
        }));

        // Claim the key and publish the (locked, uncommitted) record in one
        // step, so a concurrent retry waits on our lock.
        let claim = match &key {
            Some(k) => match self.idempotency.entry((ctx.tenant_id(), k.clone())) {
                Entry::Occupied(existing) => Err(*existing.get()),
                Entry::Vacant(slot) => {
                    let guard = self.publish_locked(id, &record)?;
                    slot.insert(id);
                    Ok(guard)
                }
            },
            None => Ok(self.publish_locked(id, &record)?),
        };
        let mut guard = match claim {
            Ok(guard) => guard,
            Err(existing_id) => return self.replay(ctx, existing_id).await,
        };

        match self.finish_create(ctx, &mut guard, &valid).await {
            Ok(()) => {
                guard.committed = true;
                Ok(guard.request.clone())
            }
            Err(e) => {
                self.records.remove(&id);
                if let Some(k) = key {
                    self.idempotency.remove(&(ctx.tenant_id(), k));
                }
                Err(e)
            }
        }
    }

    fn publish_locked(
        &self,
        id: Uuid,
        record: &SharedRecord,
    ) -> ControlPlaneResult<OwnedMutexGuard<ApprovalRecord>> {
        let guard = Arc::clone(record)
            .try_lock_owned()
            .map_err(|_| ControlPlaneError::internal("fresh approval record already locked"))?;
        self.records.insert(id, Arc::clone(record));
        Ok(guard)
    }

    async fn replay(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<ApprovalRequest> {
        let record = self.record(id)?;
        let guard = record.lock().await;
        if !guard.committed {
            return Err(ControlPlaneError::conflict(
                "a request with this idempotency key did not complete; retry",
            ));
        }
        Self::ensure_visible(&guard, ctx)?;
        info!(approval_id = %id, "Idempotent create replayed");
        Ok(guard.request.clone())
    }

    async fn finish_create(
        &self,
        ctx: &TenantContext,
        record: &mut ApprovalRecord,
        valid: &ValidatedRequest,
    ) -> ControlPlaneResult<()> {
        let initial = self.policy.initial_status(valid);

        if initial == ApprovalStatus::Approved {
            self.applier.apply(ctx, &record.request).await?;
        }

        self.audit.append(
            AuditRecord::new("approval.created", "approval", record.request.id)
                .tenant(ctx.tenant_id())
                .actor(ctx.caller().actor())
                .metadata(json!({
                    "type": record.request.approval_type,
                    "category": record.request.category,
                    "priority": record.request.priority,
                    "status": initial,
                })),
        );
        metrics::counter!("approvals.created").increment(1);

        let now = Utc::now();
        match initial {
            ApprovalStatus::Approved => {
                let reason = "auto-approved by policy".to_string();
                record.request.status = ApprovalStatus::Approved;
                record.request.resolution_reason = Some(reason.clone());
                record.request.resolved_at = Some(now);
                record.history.push(StateTransition {
                    from: Some(ApprovalStatus::Pending),
                    to: ApprovalStatus::Approved,
                    actor: AUTO_APPROVER.into(),
                    reason: Some(reason),
                    at: now,
                });
                self.audit.append(
                    AuditRecord::new("approval.auto_approved", "approval", record.request.id)
                        .tenant(ctx.tenant_id())
                        .actor(AUTO_APPROVER),
                );
                metrics::counter!("approvals.approved", "mode" => "auto").increment(1);
            }
            ApprovalStatus::MfaRequired => {
                record.request.status = ApprovalStatus::MfaRequired;
                record.history.push(StateTransition {
                    from: Some(ApprovalStatus::Pending),
                    to: ApprovalStatus::MfaRequired,
                    actor: "system".into(),
                    reason: Some("category requires step-up verification".into()),
                    at: now,
                });
            }
            ApprovalStatus::Pending | ApprovalStatus::Rejected => {}
        }

        info!(
            tenant_id = %ctx.tenant_id(),
            approval_id = %record.request.id,
            status = record.request.status.as_str(),
            "Approval request created"
        );
        Ok(())
    }

    /// Approve a PENDING or MFA_REQUIRED request on behalf of the caller.
    ///
    /// `mfa_verified` must come from a step-up check made in this same
    /// request. On any failure the request is left exactly as it was.
    pub async fn approve(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        mfa_verified: bool,
    ) -> ControlPlaneResult<ApprovalRequest> {
        self.approve_with_step_up(ctx, id, || Ok(mfa_verified)).await
    }

    /// Like [`approve`](Self::approve), but runs `step_up` under the
    /// request's lock, only once the request is known to be approvable by
    /// this caller. A one-time code handed to `step_up` is therefore never
    /// spent on a request that would fail anyway.
    pub async fn approve_with_step_up<F>(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        step_up: F,
    ) -> ControlPlaneResult<ApprovalRequest>
    where
        F: FnOnce() -> ControlPlaneResult<bool> + Send,
    {
        let record = self.record(id)?;
        let mut guard = record.lock().await;
        let current = Self::transitionable(&guard, ctx)?;

        if self.policy.require_distinct_approver() && guard.request.requester_id == ctx.user_id() {
            return Err(ControlPlaneError::Forbidden(
                "requesters cannot approve their own requests".into(),
            ));
        }
        if !step_up()? {
            warn!(approval_id = %id, user_id = %ctx.user_id(), "Approval attempted without step-up");
            metrics::counter!("approvals.mfa_missing").increment(1);
            return Err(ControlPlaneError::MfaRequired);
        }

        let result = self.applier.apply(ctx, &guard.request).await?;

        let now = Utc::now();
        let actor = ctx.caller().actor();
        self.audit.append(
            AuditRecord::new("approval.approved", "approval", id)
                .tenant(ctx.tenant_id())
                .actor(actor.clone())
                .metadata(json!({ "from": current, "applied": result })),
        );
        let request = &mut guard.request;
        request.status = ApprovalStatus::Approved;
        request.approver_id = Some(ctx.user_id());
        request.resolved_at = Some(now);
        guard.history.push(StateTransition {
            from: Some(current),
            to: ApprovalStatus::Approved,
            actor,
            reason: None,
            at: now,
        });
        metrics::counter!("approvals.approved", "mode" => "manual").increment(1);
        info!(tenant_id = %ctx.tenant_id(), approval_id = %id, "Approval request approved");
        Ok(guard.request.clone())
    }

    /// Reject a PENDING or MFA_REQUIRED request. A reason is mandatory.
    pub async fn reject(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        reason: &str,
    ) -> ControlPlaneResult<ApprovalRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ControlPlaneError::validation("reason", "is required"));
        }

        let record = self.record(id)?;
        let mut guard = record.lock().await;
        let current = Self::transitionable(&guard, ctx)?;

        let now = Utc::now();
        let actor = ctx.caller().actor();
        self.audit.append(
            AuditRecord::new("approval.rejected", "approval", id)
                .tenant(ctx.tenant_id())
                .actor(actor.clone())
                .metadata(json!({ "from": current, "reason": reason })),
        );
        let request = &mut guard.request;
        request.status = ApprovalStatus::Rejected;
        request.approver_id = Some(ctx.user_id());
        request.resolution_reason = Some(reason.to_string());
        request.resolved_at = Some(now);
        guard.history.push(StateTransition {
            from: Some(current),
            to: ApprovalStatus::Rejected,
            actor,
            reason: Some(reason.to_string()),
            at: now,
        });
        metrics::counter!("approvals.rejected").increment(1);
        info!(tenant_id = %ctx.tenant_id(), approval_id = %id, "Approval request rejected");
        Ok(guard.request.clone())
    }

    fn transitionable(
        record: &ApprovalRecord,
        ctx: &TenantContext,
    ) -> ControlPlaneResult<ApprovalStatus> {
        Self::ensure_visible(record, ctx)?;
        let status = record.request.status;
        if status.is_terminal() {
            return Err(ControlPlaneError::conflict_with(
                format!("approval request is already {}", status.as_str()),
                record.request.id,
            ));
        }
        Ok(status)
    }

    /// Other tenants' and uncommitted requests look like missing ones.
    fn ensure_visible(record: &ApprovalRecord, ctx: &TenantContext) -> ControlPlaneResult<()> {
        if !record.committed || record.request.tenant_id != ctx.tenant_id() {
            return Err(ControlPlaneError::not_found("approval", record.request.id));
        }
        Ok(())
    }

    fn record(&self, id: Uuid) -> ControlPlaneResult<SharedRecord> {
        self.records
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| ControlPlaneError::not_found("approval", id))
    }

    async fn snapshot(
        &self,
        ctx: &TenantContext,
        id: Uuid,
    ) -> ControlPlaneResult<(ApprovalRequest, Vec<StateTransition>)> {
        let record = self.record(id)?;
        let guard = record.lock().await;
        Self::ensure_visible(&guard, ctx)?;
        Ok((guard.request.clone(), guard.history.clone()))
    }

    pub async fn get(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<ApprovalRequest> {
        Ok(self.snapshot(ctx, id).await?.0)
    }

    /// Ordered transitions, oldest first.
    pub async fn get_history(
        &self,
        ctx: &TenantContext,
        id: Uuid,
    ) -> ControlPlaneResult<Vec<StateTransition>> {
        Ok(self.snapshot(ctx, id).await?.1)
    }

    /// The caller's tenant's requests matching `filter`, newest first.
    pub async fn list(&self, ctx: &TenantContext, filter: &ApprovalFilter) -> Vec<ApprovalRequest> {
        let mut out = Vec::new();
        for record in self.all_records() {
            let guard = record.lock().await;
            if guard.committed
                && guard.request.tenant_id == ctx.tenant_id()
                && filter.matches(&guard.request)
            {
                out.push(guard.request.clone());
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Requests awaiting a decision, across all tenants.
    pub async fn pending_count(&self) -> usize {
        let mut count = 0;
        for record in self.all_records() {
            let guard = record.lock().await;
            if guard.committed && !guard.request.status.is_terminal() {
                count += 1;
            }
        }
        count
    }

    fn all_records(&self) -> Vec<SharedRecord> {
        self.records.iter().map(|e| Arc::clone(e.value())).collect()
    }
}
