//! Tenant lifecycle endpoints (platform operators only), plus public signup.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use controlplane_admin::tenant_ops::{
    CreateTenantRequest, ProvisionedTenant, TenantListQuery, TenantOpResult, UpdateTenantRequest,
};
use controlplane_core::types::{CallerIdentity, Tenant};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::operator;
use crate::envelope::{ok, ApiError, ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteBody {
    pub confirm: Option<String>,
}

/// GET /tenants
pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    query: Result<Query<TenantListQuery>, QueryRejection>,
) -> ApiResult<Vec<Tenant>> {
    operator(&caller)?;
    let Query(query) = query?;
    let page = state.tenants.list(&query);
    let meta = json!({ "total": page.total, "page": page.page, "perPage": page.per_page });
    Ok(Json(ApiResponse::ok(page.tenants).with_meta(meta)))
}

/// GET /tenants/:id
pub async fn get_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Tenant> {
    operator(&caller)?;
    let Path(id) = id?;
    ok(state.tenants.get(id)?)
}

/// POST /tenants
pub async fn create_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    body: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ProvisionedTenant>>), ApiError> {
    operator(&caller)?;
    let Json(request) = body?;
    let created = state.tenants.create_tenant(&caller, request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// POST /api/v1/signup: self-service; no session required.
pub async fn signup(
    State(state): State<AppState>,
    body: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<ProvisionedTenant>>), ApiError> {
    let Json(request) = body?;
    let created = state.tenants.signup(request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

/// PATCH /tenants/:id
pub async fn update_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateTenantRequest>, JsonRejection>,
) -> ApiResult<Tenant> {
    operator(&caller)?;
    let Path(id) = id?;
    let Json(request) = body?;
    ok(state.tenants.update(&caller, id, request)?)
}

/// POST /tenants/:id/suspend
pub async fn suspend_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReasonBody>, JsonRejection>,
) -> ApiResult<TenantOpResult> {
    operator(&caller)?;
    let Path(id) = id?;
    let Json(body) = body?;
    ok(state
        .tenants
        .suspend(&caller, id, body.reason.as_deref().unwrap_or_default())?)
}

/// POST /tenants/:id/reactivate: the body is optional.
pub async fn reactivate_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Option<Json<ReasonBody>>,
) -> ApiResult<TenantOpResult> {
    operator(&caller)?;
    let Path(id) = id?;
    let reason = body.and_then(|Json(b)| b.reason);
    ok(state.tenants.reactivate(&caller, id, reason.as_deref())?)
}

/// DELETE /tenants/:id: body `{"confirm": "DELETE"}`.
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Option<Json<DeleteBody>>,
) -> ApiResult<Tenant> {
    operator(&caller)?;
    let Path(id) = id?;
    let confirm = body.and_then(|Json(b)| b.confirm);
    ok(state.tenants.delete(&caller, id, confirm.as_deref())?)
}
