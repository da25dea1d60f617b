use crate::types::{ApprovalCategory, ApprovalPriority, ApprovalType, SubscriptionTier};
use serde::Deserialize;

/// Root application configuration. Loaded from an optional
/// `config/control-plane.toml` file and environment variables with the
/// prefix `CONTROL_PLANE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub approvals: ApprovalConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub integrations: IntegrationConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// ─── Auth Config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base64-encoded HMAC key for impersonation tokens. Issuance is refused
    /// while this is unset.
    #[serde(default)]
    pub impersonation_signing_key: Option<String>,
    #[serde(default = "default_impersonation_ttl_secs")]
    pub impersonation_ttl_secs: u64,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Issuer shown in authenticator apps.
    #[serde(default = "default_totp_issuer")]
    pub totp_issuer: String,
    #[serde(default = "default_totp_digits")]
    pub totp_digits: usize,
    #[serde(default = "default_totp_step_secs")]
    pub totp_step_secs: u64,
    #[serde(default = "default_totp_skew")]
    pub totp_skew: u8,
}

/// Hard ceiling for impersonation token lifetime.
pub const MAX_IMPERSONATION_TTL_SECS: u64 = 3600;

impl AuthConfig {
    /// Configured impersonation TTL, clamped to one hour.
    pub fn effective_impersonation_ttl_secs(&self) -> u64 {
        self.impersonation_ttl_secs.clamp(1, MAX_IMPERSONATION_TTL_SECS)
    }
}

fn default_impersonation_ttl_secs() -> u64 { 3600 }
fn default_session_ttl_hours() -> i64 { 8 }
fn default_totp_issuer() -> String { "ControlPlane".to_string() }
fn default_totp_digits() -> usize { 6 }
fn default_totp_step_secs() -> u64 { 30 }
fn default_totp_skew() -> u8 { 1 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            impersonation_signing_key: None,
            impersonation_ttl_secs: default_impersonation_ttl_secs(),
            session_ttl_hours: default_session_ttl_hours(),
            totp_issuer: default_totp_issuer(),
            totp_digits: default_totp_digits(),
            totp_step_secs: default_totp_step_secs(),
            totp_skew: default_totp_skew(),
        }
    }
}

// ─── Approval Config ────────────────────────────────────────────────────────

/// One auto-approval rule. A request matches when its category is listed,
/// its priority is at or below `max_priority`, and (if `types` is non-empty)
/// its type is listed.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoApproveRule {
    pub categories: Vec<ApprovalCategory>,
    pub max_priority: ApprovalPriority,
    #[serde(default)]
    pub types: Vec<ApprovalType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_auto_approve_rules")]
    pub auto_approve: Vec<AutoApproveRule>,
    /// Categories that always start in MFA_REQUIRED, bypassing auto-approval.
    #[serde(default = "default_step_up_categories")]
    pub step_up_categories: Vec<ApprovalCategory>,
    /// Two-person rule: the approver must not be the requester.
    #[serde(default = "default_require_distinct_approver")]
    pub require_distinct_approver: bool,
}

fn default_auto_approve_rules() -> Vec<AutoApproveRule> {
    vec![AutoApproveRule {
        categories: vec![ApprovalCategory::Operational],
        max_priority: ApprovalPriority::Low,
        types: Vec::new(),
    }]
}
fn default_step_up_categories() -> Vec<ApprovalCategory> {
    vec![ApprovalCategory::Security]
}
fn default_require_distinct_approver() -> bool { true }

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            auto_approve: default_auto_approve_rules(),
            step_up_categories: default_step_up_categories(),
            require_distinct_approver: default_require_distinct_approver(),
        }
    }
}

// ─── Pricing Config ─────────────────────────────────────────────────────────

/// Static monthly list price per tier, used for revenue estimates only.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_starter_price")]
    pub starter: f64,
    #[serde(default = "default_professional_price")]
    pub professional: f64,
    #[serde(default = "default_enterprise_price")]
    pub enterprise: f64,
}

impl PricingConfig {
    pub fn monthly_price(&self, tier: SubscriptionTier) -> f64 {
        match tier {
            SubscriptionTier::Starter => self.starter,
            SubscriptionTier::Professional => self.professional,
            SubscriptionTier::Enterprise => self.enterprise,
        }
    }
}

fn default_starter_price() -> f64 { 49.0 }
fn default_professional_price() -> f64 { 149.0 }
fn default_enterprise_price() -> f64 { 499.0 }

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            starter: default_starter_price(),
            professional: default_professional_price(),
            enterprise: default_enterprise_price(),
        }
    }
}

// ─── Integration Config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationConfig {
    /// Checks that succeed slower than this are DEGRADED.
    #[serde(default = "default_healthy_latency_ms")]
    pub healthy_latency_ms: u64,
    /// Checks exceeding this are recorded as DOWN.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_sync_workers")]
    pub sync_workers: usize,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
}

fn default_healthy_latency_ms() -> u64 { 1000 }
fn default_check_timeout_ms() -> u64 { 5000 }
fn default_queue_capacity() -> usize { 1024 }
fn default_sync_workers() -> usize { 4 }
fn default_schedule_interval_secs() -> u64 { 900 }

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            healthy_latency_ms: default_healthy_latency_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            sync_workers: default_sync_workers(),
            schedule_interval_secs: default_schedule_interval_secs(),
        }
    }
}

// ─── Tenancy Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Every storage namespace starts with this prefix.
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,
}

fn default_namespace_prefix() -> String {
    "tenant_".to_string()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
        }
    }
}

// Default functions
fn default_node_id() -> String {
    "control-plane-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            auth: AuthConfig::default(),
            approvals: ApprovalConfig::default(),
            pricing: PricingConfig::default(),
            integrations: IntegrationConfig::default(),
            tenancy: TenancyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `config/control-plane.toml` (if present) and
    /// `CONTROL_PLANE__*` environment variables, env taking precedence.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/control-plane").required(false))
            .add_source(
                config::Environment::with_prefix("CONTROL_PLANE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let config = builder.build()?;
        let loaded: Self = config.try_deserialize()?;
        tracing::debug!(node_id = %loaded.node_id, "Configuration sources merged");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert!(config.auth.impersonation_signing_key.is_none());
        assert_eq!(config.approvals.step_up_categories, vec![ApprovalCategory::Security]);
        assert_eq!(config.pricing.monthly_price(SubscriptionTier::Enterprise), 499.0);
        assert_eq!(config.tenancy.namespace_prefix, "tenant_");
    }

    #[test]
    fn test_impersonation_ttl_is_capped_at_one_hour() {
        let mut auth = AuthConfig::default();
        auth.impersonation_ttl_secs = 86_400;
        assert_eq!(auth.effective_impersonation_ttl_secs(), MAX_IMPERSONATION_TTL_SECS);
        auth.impersonation_ttl_secs = 900;
        assert_eq!(auth.effective_impersonation_ttl_secs(), 900);
    }

    #[test]
    fn test_auto_approve_rule_deserializes() {
        let rule: AutoApproveRule = serde_json::from_str(
            r#"{"categories": ["operational", "configuration"], "max_priority": "medium"}"#,
        )
        .unwrap();
        assert_eq!(rule.categories.len(), 2);
        assert_eq!(rule.max_priority, ApprovalPriority::Medium);
        assert!(rule.types.is_empty());
    }
}
