//! Integration registry, health checks and sync triggers.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use controlplane_core::types::CallerIdentity;
use controlplane_integrations::{
    HealthSnapshot, Integration, IntegrationFilter, IntegrationHealth, NewIntegration, SyncJob,
};
use controlplane_platform::gate::{ADMIN_ROLES, OPERATOR_ROLES};
use controlplane_platform::tenancy::features;
use controlplane_platform::AccessPolicy;
use serde_json::json;
use uuid::Uuid;

use crate::auth::tenant_context;
use crate::envelope::{ok, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

fn operate_policy() -> AccessPolicy {
    AccessPolicy::write()
        .roles(OPERATOR_ROLES)
        .feature(features::INTEGRATIONS)
}

/// GET /integrations
pub async fn list_integrations(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    filter: Result<Query<IntegrationFilter>, QueryRejection>,
) -> ApiResult<Vec<Integration>> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Query(filter) = filter?;
    let integrations = state.integrations.list(&ctx, &filter);
    let meta = json!({ "total": integrations.len() });
    Ok(Json(ApiResponse::ok(integrations).with_meta(meta)))
}

/// POST /integrations
pub async fn register_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    body: Result<Json<NewIntegration>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Integration>>), ApiError> {
    let policy = AccessPolicy::write()
        .roles(ADMIN_ROLES)
        .feature(features::INTEGRATIONS);
    let ctx = tenant_context(&state, &caller, &policy)?;
    let Json(input) = body?;
    let created = state.integrations.register(&ctx, input)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// GET /integrations/:id
pub async fn get_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Integration> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Path(id) = id?;
    ok(state.integrations.get(&ctx, id)?)
}

/// POST /integrations/:id/test
///
/// A failing connection is a successful request: the snapshot carries the
/// DOWN status and the message.
pub async fn test_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<HealthSnapshot> {
    let policy = AccessPolicy::read()
        .roles(OPERATOR_ROLES)
        .feature(features::INTEGRATIONS);
    let ctx = tenant_context(&state, &caller, &policy)?;
    let Path(id) = id?;
    ok(state.integrations.test_connection(&ctx, id).await?)
}

/// POST /integrations/:id/sync: 202 with the queued job.
pub async fn sync_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<(StatusCode, Json<ApiResponse<SyncJob>>), ApiError> {
    let ctx = tenant_context(&state, &caller, &operate_policy())?;
    let Path(id) = id?;
    let job = state.integrations.sync_integration(&ctx, id).await?;
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(job))))
}

/// POST /integrations/:id/pause
pub async fn pause_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Integration> {
    let ctx = tenant_context(&state, &caller, &operate_policy())?;
    let Path(id) = id?;
    ok(state.integrations.pause(&ctx, id)?)
}

/// POST /integrations/:id/resume
pub async fn resume_integration(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Integration> {
    let ctx = tenant_context(&state, &caller, &operate_policy())?;
    let Path(id) = id?;
    ok(state.integrations.resume(&ctx, id)?)
}

/// GET /integrations/:id/health
pub async fn integration_health(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<IntegrationHealth> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Path(id) = id?;
    ok(state.integrations.integration_health(&ctx, id)?)
}

/// GET /integrations/:id/jobs
pub async fn integration_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Vec<SyncJob>> {
    let ctx = tenant_context(&state, &caller, &AccessPolicy::read())?;
    let Path(id) = id?;
    ok(state.integrations.jobs_for(&ctx, id)?)
}
