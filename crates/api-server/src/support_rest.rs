//! Support tooling: impersonation, MFA enrollment and the audit trail.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use controlplane_admin::ImpersonationGrant;
use controlplane_core::types::CallerIdentity;
use controlplane_platform::{AccessPolicy, AuditLogEntry, AuditQuery, MfaEnrollment};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{operator, tenant_context};
use crate::envelope::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 1000;

/// POST /impersonate/:user_id
pub async fn impersonate(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ImpersonationGrant>>), ApiError> {
    operator(&caller)?;
    let Path(user_id) = user_id?;
    let grant = state.impersonation.issue(&caller, user_id)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(grant))))
}

/// POST /mfa/enroll: enrolls the calling user. The secret is shown once.
pub async fn enroll_mfa(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<(StatusCode, Json<ApiResponse<MfaEnrollment>>), ApiError> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let enrollment = state.mfa.enroll(ctx.user_id())?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(enrollment))))
}

/// GET /audit-log: newest first.
pub async fn audit_log(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> ApiResult<Vec<AuditLogEntry>> {
    operator(&caller)?;
    let Query(mut query) = query?;
    query.limit = Some(
        query
            .limit
            .unwrap_or(DEFAULT_AUDIT_LIMIT)
            .clamp(1, MAX_AUDIT_LIMIT),
    );
    let entries = state.audit.query(&query);
    let meta = json!({ "count": entries.len(), "totalEntries": state.audit.len() });
    Ok(Json(ApiResponse::ok(entries).with_meta(meta)))
}
