//! Approval workflow endpoints. The approve endpoint is the only place a
//! step-up code is turned into `mfa_verified`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use controlplane_approvals::{ApprovalFilter, ApprovalRequest, NewApprovalRequest, StateTransition};
use controlplane_core::types::CallerIdentity;
use controlplane_platform::gate::ADMIN_ROLES;
use controlplane_platform::tenancy::features;
use controlplane_platform::AccessPolicy;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::auth::tenant_context;
use crate::envelope::{ok, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    /// TOTP or backup code verified in this request.
    pub mfa_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    pub reason: Option<String>,
}

fn submit_policy() -> AccessPolicy {
    AccessPolicy::write().feature(features::APPROVAL_WORKFLOWS)
}

fn decide_policy() -> AccessPolicy {
    AccessPolicy::write()
        .roles(ADMIN_ROLES)
        .feature(features::APPROVAL_WORKFLOWS)
}

/// GET /approvals
pub async fn list_approvals(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    filter: Result<Query<ApprovalFilter>, QueryRejection>,
) -> ApiResult<Vec<ApprovalRequest>> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Query(filter) = filter?;
    let approvals = state.approvals.list(&ctx, &filter).await;
    let meta = json!({ "total": approvals.len() });
    Ok(Json(ApiResponse::ok(approvals).with_meta(meta)))
}

/// GET /approvals/:id
pub async fn get_approval(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<ApprovalRequest> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Path(id) = id?;
    ok(state.approvals.get(&ctx, id).await?)
}

/// POST /approvals: honours an `Idempotency-Key` header.
pub async fn create_approval(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    headers: HeaderMap,
    body: Result<Json<NewApprovalRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ApprovalRequest>>), ApiError> {
    let ctx = tenant_context(&state, &caller, &submit_policy())?;
    let Json(input) = body?;
    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    let created = state.approvals.create(&ctx, input, key).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// POST /approvals/:id/approve: body `{"mfaToken": "123456"}`.
pub async fn approve(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Option<Json<ApproveBody>>,
) -> ApiResult<ApprovalRequest> {
    let ctx = tenant_context(&state, &caller, &decide_policy())?;
    let Path(id) = id?;
    let token = body
        .and_then(|Json(b)| b.mfa_token)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    // The code is checked under the request lock, after the request is known
    // to be approvable, so a backup code is only spent on a real decision.
    let approved = match token {
        Some(code) => {
            let user_id = ctx.user_id();
            let mfa = &state.mfa;
            state
                .approvals
                .approve_with_step_up(&ctx, id, || {
                    let proof = mfa.verify(user_id, &code)?;
                    debug!(user_id = %proof.user_id, method = ?proof.method, "Step-up verified for approval");
                    Ok(true)
                })
                .await?
        }
        None => state.approvals.approve(&ctx, id, false).await?,
    };

    ok(approved)
}

/// POST /approvals/:id/reject: body `{"reason": "..."}`.
pub async fn reject(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RejectBody>, JsonRejection>,
) -> ApiResult<ApprovalRequest> {
    let ctx = tenant_context(&state, &caller, &decide_policy())?;
    let Path(id) = id?;
    let Json(body) = body?;
    let reason = body.reason.unwrap_or_default();
    ok(state.approvals.reject(&ctx, id, &reason).await?)
}

/// GET /approvals/:id/history
pub async fn history(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<StateTransition>> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Path(id) = id?;
    ok(state.approvals.get_history(&ctx, id).await?)
}
