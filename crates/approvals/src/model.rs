//! Approval request records, the submission payload, and transition history.

use chrono::{DateTime, Utc};
use controlplane_core::types::{ApprovalCategory, ApprovalPriority, ApprovalType};
use controlplane_core::{ControlPlaneError, ControlPlaneResult, FieldIssue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    MfaRequired,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    /// APPROVED and REJECTED never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(rename = "type")]
    pub approval_type: ApprovalType,
    pub category: ApprovalCategory,
    pub priority: ApprovalPriority,
    pub title: String,
    pub description: String,
    /// Opaque to the engine; interpreted only by the change applier.
    pub requested_changes: serde_json::Value,
    pub rationale: Option<String>,
    pub requester_id: Uuid,
    pub status: ApprovalStatus,
    pub approver_id: Option<Uuid>,
    pub resolution_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Submission payload. Every field is optional at the wire level so that
/// missing fields come back as field-level validation issues.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApprovalRequest {
    #[serde(rename = "type")]
    pub approval_type: Option<ApprovalType>,
    pub category: Option<ApprovalCategory>,
    pub priority: Option<ApprovalPriority>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub requested_changes: Option<serde_json::Value>,
    pub rationale: Option<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub approval_type: ApprovalType,
    pub category: ApprovalCategory,
    pub priority: ApprovalPriority,
    pub title: String,
    pub description: String,
    pub requested_changes: serde_json::Value,
    pub rationale: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl NewApprovalRequest {
    pub fn validate(&self) -> ControlPlaneResult<ValidatedRequest> {
        let mut issues = Vec::new();

        if self.approval_type.is_none() {
            issues.push(FieldIssue::new("type", "is required"));
        }
        if self.category.is_none() {
            issues.push(FieldIssue::new("category", "is required"));
        }
        let title = non_blank(&self.title);
        if title.is_none() {
            issues.push(FieldIssue::new("title", "is required"));
        } else if title.as_ref().is_some_and(|t| t.len() > 200) {
            issues.push(FieldIssue::new("title", "must be at most 200 characters"));
        }
        let description = non_blank(&self.description);
        if description.is_none() {
            issues.push(FieldIssue::new("description", "is required"));
        }
        match &self.requested_changes {
            None | Some(serde_json::Value::Null) => {
                issues.push(FieldIssue::new("requestedChanges", "is required"));
            }
            Some(serde_json::Value::Object(map)) if map.is_empty() => {
                issues.push(FieldIssue::new("requestedChanges", "must not be empty"));
            }
            _ => {}
        }

        match (self.approval_type, self.category, title, description) {
            (Some(approval_type), Some(category), Some(title), Some(description))
                if issues.is_empty() =>
            {
                Ok(ValidatedRequest {
                    approval_type,
                    category,
                    priority: self.priority.unwrap_or(ApprovalPriority::Medium),
                    title,
                    description,
                    requested_changes: self.requested_changes.clone().unwrap_or_default(),
                    rationale: non_blank(&self.rationale),
                })
            }
            _ => Err(ControlPlaneError::Validation(issues)),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One recorded state change. `from` is `None` for the creation entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub from: Option<ApprovalStatus>,
    pub to: ApprovalStatus,
    pub actor: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    #[serde(rename = "type")]
    pub approval_type: Option<ApprovalType>,
    pub requester_id: Option<Uuid>,
}

impl ApprovalFilter {
    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        self.status.map_or(true, |s| s == request.status)
            && self.approval_type.map_or(true, |t| t == request.approval_type)
            && self.requester_id.map_or(true, |r| r == request.requester_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = NewApprovalRequest::default().validate().unwrap_err();
        match err {
            ControlPlaneError::Validation(issues) => {
                let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec!["type", "category", "title", "description", "requestedChanges"]
                );
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_title_rejected() {
        let req = NewApprovalRequest {
            approval_type: Some(ApprovalType::ConfigChange),
            category: Some(ApprovalCategory::Configuration),
            title: Some("   ".into()),
            description: Some("d".into()),
            requested_changes: Some(json!({"settings": {"a": 1}})),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_priority_defaults_to_medium() {
        let req: NewApprovalRequest = serde_json::from_value(json!({
            "type": "feature-flag",
            "category": "configuration",
            "title": "Enable SSO",
            "description": "Turn on SSO",
            "requestedChanges": {"feature": "sso", "value": true}
        }))
        .unwrap();
        let valid = req.validate().unwrap();
        assert_eq!(valid.priority, ApprovalPriority::Medium);
        assert_eq!(valid.approval_type, ApprovalType::FeatureFlag);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_value(ApprovalStatus::MfaRequired).unwrap(),
            json!("MFA_REQUIRED")
        );
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(!ApprovalStatus::MfaRequired.is_terminal());
    }
}
