use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// A single field-level problem reported with a validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("tenant not found")]
    TenantNotFound,

    #[error("subscription is {status}; state-changing operations are disabled")]
    SubscriptionInactive { status: String },

    #[error("feature `{feature}` is not available on the current plan")]
    FeatureNotAvailable { feature: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {} issue(s)", .0.len())]
    Validation(Vec<FieldIssue>),

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        existing_id: Option<Uuid>,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("step-up MFA verification is required for this action")]
    MfaRequired,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ControlPlaneError {
    /// Single-field validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldIssue::new(field, message)])
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: None,
        }
    }

    /// Conflict that points the caller at the record already holding the slot.
    pub fn conflict_with(message: impl Into<String>, existing_id: Uuid) -> Self {
        Self::Conflict {
            message: message.into(),
            existing_id: Some(existing_id),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(message.into()))
    }

    /// HTTP status the boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TenantNotFound => 404,
            Self::SubscriptionInactive { .. } => 403,
            Self::FeatureNotAvailable { .. } => 403,
            Self::Forbidden(_) => 403,
            Self::Validation(_) => 400,
            Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::Unauthorized(_) | Self::MfaRequired => 401,
            Self::Config(_) | Self::Internal(_) => 500,
        }
    }

    /// Machine-readable error code carried in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::SubscriptionInactive { .. } => "SUBSCRIPTION_INACTIVE",
            Self::FeatureNotAvailable { .. } => "FEATURE_NOT_AVAILABLE",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::Config(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for failures that must never leak detail to the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(ControlPlaneError::TenantNotFound.status_code(), 404);
        assert_eq!(
            ControlPlaneError::SubscriptionInactive {
                status: "suspended".into()
            }
            .status_code(),
            403
        );
        assert_eq!(ControlPlaneError::validation("slug", "required").status_code(), 400);
        assert_eq!(ControlPlaneError::conflict("taken").status_code(), 409);
        assert_eq!(ControlPlaneError::MfaRequired.status_code(), 401);
        assert_eq!(ControlPlaneError::internal("boom").status_code(), 500);
    }

    #[test]
    fn test_mfa_required_is_distinct_from_unauthorized() {
        assert_eq!(ControlPlaneError::MfaRequired.code(), "MFA_REQUIRED");
        assert_eq!(
            ControlPlaneError::Unauthorized("no session".into()).code(),
            "UNAUTHORIZED"
        );
    }

    #[test]
    fn test_internal_errors_are_flagged() {
        assert!(ControlPlaneError::Config("missing key".into()).is_internal());
        assert!(!ControlPlaneError::TenantNotFound.is_internal());
    }
}
