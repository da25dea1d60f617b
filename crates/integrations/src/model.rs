//! Integration, health and sync-job records.

use chrono::{DateTime, Utc};
use controlplane_core::{ControlPlaneError, ControlPlaneResult, FieldIssue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    Accounting,
    Ecommerce,
    Erp,
    Marketplace,
    Crm,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
    /// No check has ever run.
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub endpoint: Option<String>,
    /// Opaque reference into the secret store; never the secret itself.
    pub credentials_ref: Option<String>,
    pub is_active: bool,
    pub health_status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewIntegration {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub integration_type: Option<IntegrationType>,
    pub endpoint: Option<String>,
    pub credentials_ref: Option<String>,
}

impl NewIntegration {
    pub fn validate(&self) -> ControlPlaneResult<(String, IntegrationType)> {
        let mut issues = Vec::new();
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if name.is_none() {
            issues.push(FieldIssue::new("name", "is required"));
        }
        if self.integration_type.is_none() {
            issues.push(FieldIssue::new("type", "is required"));
        }
        if let Some(endpoint) = &self.endpoint {
            if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                issues.push(FieldIssue::new("endpoint", "must be an http(s) URL"));
            }
        }
        match (name, self.integration_type) {
            (Some(name), Some(kind)) if issues.is_empty() => Ok((name.to_string(), kind)),
            _ => Err(ControlPlaneError::Validation(issues)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationFilter {
    #[serde(rename = "type")]
    pub integration_type: Option<IntegrationType>,
    pub is_active: Option<bool>,
    pub health_status: Option<HealthStatus>,
}

impl IntegrationFilter {
    pub fn matches(&self, integration: &Integration) -> bool {
        self.integration_type
            .map_or(true, |t| t == integration.integration_type)
            && self.is_active.map_or(true, |a| a == integration.is_active)
            && self
                .health_status
                .map_or(true, |h| h == integration.health_status)
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// One stored health-check outcome, kept for error-rate windows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub integration_id: Uuid,
    pub tenant_id: Uuid,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub integration_id: Uuid,
    pub status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    /// Why the last check was not HEALTHY.
    pub message: Option<String>,
}

impl From<&Integration> for HealthSnapshot {
    fn from(i: &Integration) -> Self {
        Self {
            integration_id: i.id,
            status: i.health_status,
            last_checked_at: i.last_checked_at,
            last_latency_ms: i.last_latency_ms,
            message: i.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRateSummary {
    pub checks_last_hour: usize,
    pub failed_checks_last_hour: usize,
    pub failed_checks_last_day: usize,
    pub failed_syncs_last_day: usize,
    /// Failed fraction of last-hour checks; 0 when there were none.
    pub error_rate_last_hour: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationHealth {
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    pub is_active: bool,
    pub error_rate: ErrorRateSummary,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub down: usize,
    pub unknown: usize,
}

impl HealthCounts {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Down => self.down += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.down + self.unknown
    }
}

// ---------------------------------------------------------------------------
// Sync jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl SyncJobStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
}

/// Counts reported by a finished sync run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub records_processed: u64,
    pub records_created: u64,
    pub records_updated: u64,
    pub records_failed: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub tenant_id: Uuid,
    /// `None` for scheduler-triggered runs.
    pub triggered_by: Option<Uuid>,
    pub trigger: SyncTrigger,
    pub status: SyncJobStatus,
    /// Handle assigned by the execution queue.
    pub queue_job_id: Option<String>,
    pub summary: Option<SyncSummary>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_integration_validation() {
        let err = NewIntegration::default().validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let bad_url = NewIntegration {
            name: Some("Books".into()),
            integration_type: Some(IntegrationType::Accounting),
            endpoint: Some("ftp://books".into()),
            credentials_ref: None,
        };
        assert!(bad_url.validate().is_err());

        let ok: NewIntegration = serde_json::from_value(json!({
            "name": "Shop", "type": "ecommerce", "endpoint": "https://shop.example/api/ping"
        }))
        .unwrap();
        assert_eq!(ok.validate().unwrap().1, IntegrationType::Ecommerce);
    }

    #[test]
    fn test_health_counts() {
        let mut counts = HealthCounts::default();
        counts.record(HealthStatus::Healthy);
        counts.record(HealthStatus::Down);
        counts.record(HealthStatus::Down);
        assert_eq!(counts.down, 2);
        assert_eq!(counts.total(), 3);
    }
}
