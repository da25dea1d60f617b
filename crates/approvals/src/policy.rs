use controlplane_core::config::{ApprovalConfig, AutoApproveRule};
use controlplane_core::types::ApprovalCategory;

use crate::model::{ApprovalStatus, ValidatedRequest};

/// Decides the status a new request starts in.
///
/// Step-up categories always start in MFA_REQUIRED and are never
/// auto-approved. Otherwise a matching auto-approve rule yields APPROVED.
#[derive(Debug, Clone)]
pub struct AutoApprovalPolicy {
    rules: Vec<AutoApproveRule>,
    step_up_categories: Vec<ApprovalCategory>,
    require_distinct_approver: bool,
}

impl AutoApprovalPolicy {
    pub fn from_config(config: &ApprovalConfig) -> Self {
        Self {
            rules: config.auto_approve.clone(),
            step_up_categories: config.step_up_categories.clone(),
            require_distinct_approver: config.require_distinct_approver,
        }
    }

    pub fn initial_status(&self, request: &ValidatedRequest) -> ApprovalStatus {
        if self.step_up_categories.contains(&request.category) {
            return ApprovalStatus::MfaRequired;
        }
        let auto = self.rules.iter().any(|rule| {
            rule.categories.contains(&request.category)
                && request.priority.rank() <= rule.max_priority.rank()
                && (rule.types.is_empty() || rule.types.contains(&request.approval_type))
        });
        if auto {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        }
    }

    pub fn require_distinct_approver(&self) -> bool {
        self.require_distinct_approver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controlplane_core::types::{ApprovalPriority, ApprovalType};
    use serde_json::json;

    fn request(category: ApprovalCategory, priority: ApprovalPriority) -> ValidatedRequest {
        ValidatedRequest {
            approval_type: ApprovalType::ConfigChange,
            category,
            priority,
            title: "t".into(),
            description: "d".into(),
            requested_changes: json!({"settings": {"x": 1}}),
            rationale: None,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = AutoApprovalPolicy::from_config(&ApprovalConfig::default());
        assert_eq!(
            policy.initial_status(&request(ApprovalCategory::Operational, ApprovalPriority::Low)),
            ApprovalStatus::Approved
        );
        assert_eq!(
            policy.initial_status(&request(ApprovalCategory::Operational, ApprovalPriority::High)),
            ApprovalStatus::Pending
        );
        assert_eq!(
            policy.initial_status(&request(
                ApprovalCategory::Configuration,
                ApprovalPriority::Low
            )),
            ApprovalStatus::Pending
        );
    }

    #[test]
    fn test_step_up_category_beats_auto_rule() {
        let mut config = ApprovalConfig::default();
        config.auto_approve = vec![AutoApproveRule {
            categories: vec![ApprovalCategory::Security, ApprovalCategory::Operational],
            max_priority: ApprovalPriority::Critical,
            types: Vec::new(),
        }];
        let policy = AutoApprovalPolicy::from_config(&config);
        assert_eq!(
            policy.initial_status(&request(ApprovalCategory::Security, ApprovalPriority::Low)),
            ApprovalStatus::MfaRequired
        );
    }

    #[test]
    fn test_rule_type_restriction() {
        let mut config = ApprovalConfig::default();
        config.auto_approve = vec![AutoApproveRule {
            categories: vec![ApprovalCategory::Configuration],
            max_priority: ApprovalPriority::Medium,
            types: vec![ApprovalType::FeatureFlag],
        }];
        let policy = AutoApprovalPolicy::from_config(&config);
        // ConfigChange is not in the rule's type list.
        assert_eq!(
            policy.initial_status(&request(ApprovalCategory::Configuration, ApprovalPriority::Low)),
            ApprovalStatus::Pending
        );
    }
}
