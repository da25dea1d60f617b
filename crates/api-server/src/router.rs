//! Route table. Everything under `/api/v1/admin` requires a bearer session.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::state::AppState;
use crate::{approval_rest, integration_rest, metrics_rest, rest, support_rest, tenant_rest};

pub const ADMIN_PREFIX: &str = "/api/v1/admin";

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Tenant lifecycle
        .route(
            "/tenants",
            get(tenant_rest::list_tenants).post(tenant_rest::create_tenant),
        )
        .route(
            "/tenants/:id",
            get(tenant_rest::get_tenant)
                .patch(tenant_rest::update_tenant)
                .delete(tenant_rest::delete_tenant),
        )
        .route("/tenants/:id/suspend", post(tenant_rest::suspend_tenant))
        .route("/tenants/:id/reactivate", post(tenant_rest::reactivate_tenant))
        // Provider metrics
        .route("/metrics/overview", get(metrics_rest::overview))
        .route("/metrics/revenue", get(metrics_rest::revenue))
        .route("/metrics/system-health", get(metrics_rest::system_health))
        // Approvals
        .route(
            "/approvals",
            get(approval_rest::list_approvals).post(approval_rest::create_approval),
        )
        .route("/approvals/:id", get(approval_rest::get_approval))
        .route("/approvals/:id/approve", post(approval_rest::approve))
        .route("/approvals/:id/reject", post(approval_rest::reject))
        .route("/approvals/:id/history", get(approval_rest::history))
        // Integrations
        .route(
            "/integrations",
            get(integration_rest::list_integrations).post(integration_rest::register_integration),
        )
        .route("/integrations/:id", get(integration_rest::get_integration))
        .route("/integrations/:id/test", post(integration_rest::test_integration))
        .route("/integrations/:id/sync", post(integration_rest::sync_integration))
        .route("/integrations/:id/pause", post(integration_rest::pause_integration))
        .route("/integrations/:id/resume", post(integration_rest::resume_integration))
        .route("/integrations/:id/health", get(integration_rest::integration_health))
        .route("/integrations/:id/jobs", get(integration_rest::integration_jobs))
        // Support
        .route("/impersonate/:user_id", post(support_rest::impersonate))
        .route("/mfa/enroll", post(support_rest::enroll_mfa))
        .route("/audit-log", get(support_rest::audit_log))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
}

/// Build the full application router with middleware applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest(ADMIN_PREFIX, admin_routes(&state))
        .route("/api/v1/signup", post(tenant_rest::signup))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
