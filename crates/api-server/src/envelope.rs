//! Uniform response envelope and the HTTP mapping of the error taxonomy.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use controlplane_core::ControlPlaneError;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

/// `{success, data | error, meta?}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap a value in a success envelope.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

/// Boundary error: a [`ControlPlaneError`] on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub ControlPlaneError);

impl From<ControlPlaneError> for ApiError {
    fn from(e: ControlPlaneError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ControlPlaneError::validation("body", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(ControlPlaneError::validation("path", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ControlPlaneError::validation("query", rejection.body_text()))
    }
}

impl ApiError {
    fn details(&self) -> Option<Value> {
        match &self.0 {
            ControlPlaneError::Validation(issues) => Some(json!({ "issues": issues })),
            ControlPlaneError::Conflict {
                existing_id: Some(id),
                ..
            } => Some(json!({ "existingId": id })),
            ControlPlaneError::SubscriptionInactive { status } => Some(json!({ "status": status })),
            ControlPlaneError::FeatureNotAvailable { feature } => {
                Some(json!({ "feature": feature }))
            }
            ControlPlaneError::TenantNotFound
            | ControlPlaneError::Forbidden(_)
            | ControlPlaneError::Conflict { .. }
            | ControlPlaneError::NotFound { .. }
            | ControlPlaneError::Unauthorized(_)
            | ControlPlaneError::MfaRequired
            | ControlPlaneError::Config(_)
            | ControlPlaneError::Internal(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.0.is_internal() {
            error!(error = ?self.0, "Request failed with internal error");
            metrics::counter!("api.errors").increment(1);
            "An internal error occurred".to_string()
        } else {
            if status.is_client_error() {
                warn!(code = self.0.code(), error = %self.0, "Request rejected");
            }
            self.0.to_string()
        };

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.0.code(),
                message,
                details: self.details(),
            }),
            meta: None,
        };
        (status, Json(body)).into_response()
    }
}
