//! Bearer-session authentication and the per-request context helpers.
//!
//! The middleware only establishes *who* is calling. Tenant resolution and
//! capability gates run inside each handler, before any mutation.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use controlplane_core::types::{CallerIdentity, TenantContext};
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use controlplane_platform::gate::require_platform_operator;
use controlplane_platform::AccessPolicy;

use crate::envelope::ApiError;
use crate::state::AppState;

/// Reject requests without a live session; otherwise attach the caller.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let caller = match token {
        Some(token) => state.sessions.authenticate(token),
        None => Err(ControlPlaneError::Unauthorized(
            "Authorization header with Bearer token required".into(),
        )),
    };

    match caller {
        Ok(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(e) => {
            metrics::counter!("api.auth_failures").increment(1);
            ApiError(e).into_response()
        }
    }
}

/// Resolve the caller's tenant and run the endpoint's gates.
pub fn tenant_context(
    state: &AppState,
    caller: &CallerIdentity,
    policy: &AccessPolicy,
) -> ControlPlaneResult<TenantContext> {
    let ctx = state.resolver.resolve(caller)?;
    policy.check(&ctx)?;
    tracing::debug!(
        request_id = %ctx.request_id(),
        tenant_id = %ctx.tenant_id(),
        user_id = %ctx.user_id(),
        "Tenant context resolved"
    );
    Ok(ctx)
}

/// Gate for the cross-tenant master admin routes.
pub fn operator(caller: &CallerIdentity) -> ControlPlaneResult<&CallerIdentity> {
    require_platform_operator(caller)?;
    Ok(caller)
}
