//! Operational endpoints: health, readiness and liveness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub audit_entries: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        audit_entries: state.audit.len(),
    })
}

/// GET /ready: 503 while the audit chain fails verification.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.audit.verify_chain().chain_intact {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
