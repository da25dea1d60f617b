//! Provider-level metrics for platform operators.

use axum::extract::State;
use axum::Extension;
use controlplane_admin::provider_dashboard::{OverviewMetrics, RevenueMetrics, SystemHealth};
use controlplane_core::types::CallerIdentity;

use crate::auth::operator;
use crate::envelope::{ok, ApiResult};
use crate::state::AppState;

/// GET /metrics/overview
pub async fn overview(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> ApiResult<OverviewMetrics> {
    operator(&caller)?;
    ok(state.dashboard.overview())
}

/// GET /metrics/revenue: list-price estimate, not billing data.
pub async fn revenue(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> ApiResult<RevenueMetrics> {
    operator(&caller)?;
    ok(state.dashboard.revenue())
}

/// GET /metrics/system-health
pub async fn system_health(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> ApiResult<SystemHealth> {
    operator(&caller)?;
    ok(state.dashboard.system_health().await)
}
