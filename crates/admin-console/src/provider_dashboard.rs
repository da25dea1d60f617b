//! Provider dashboard: cross-tenant overview for the platform operator.
//! Aggregates tenants, approvals, integrations and the audit chain into
//! single views. Revenue figures are list-price estimates, not a ledger.

use chrono::{DateTime, Datelike, Utc};
use controlplane_approvals::ApprovalEngine;
use controlplane_core::config::PricingConfig;
use controlplane_core::types::{SubscriptionStatus, SubscriptionTier, Tenant};
use controlplane_integrations::{HealthCounts, IntegrationOrchestrator};
use controlplane_platform::{AuditLog, ChainVerification, TenantDirectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Top-level tenant overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewMetrics {
    pub total_tenants: u64,
    pub by_status: StatusBreakdown,
    pub by_tier: TierBreakdown,
    pub deleted_tenants: u64,
    pub new_this_month: u64,
    pub churned_this_month: u64,
    pub estimated_mrr: f64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub trial: u64,
    pub active: u64,
    pub suspended: u64,
    pub cancelled: u64,
}

/// Tenant count by subscription tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierBreakdown {
    pub starter: u64,
    pub professional: u64,
    pub enterprise: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRevenue {
    pub tier: SubscriptionTier,
    pub active_tenants: u64,
    pub monthly_price: f64,
    pub mrr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMetrics {
    pub tiers: Vec<TierRevenue>,
    pub mrr: f64,
    pub arr: f64,
    /// Always true: derived from the static price table.
    pub is_estimate: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    /// "ok" or "degraded".
    pub status: &'static str,
    pub integrations: HealthCounts,
    pub in_flight_sync_jobs: usize,
    pub pending_approvals: usize,
    pub audit: ChainVerification,
    pub generated_at: DateTime<Utc>,
}

/// Dashboard builder composing the shared stores.
pub struct ProviderDashboard {
    directory: Arc<TenantDirectory>,
    approvals: Arc<ApprovalEngine>,
    integrations: Arc<IntegrationOrchestrator>,
    audit: Arc<AuditLog>,
    pricing: PricingConfig,
}

impl ProviderDashboard {
    pub fn new(
        directory: Arc<TenantDirectory>,
        approvals: Arc<ApprovalEngine>,
        integrations: Arc<IntegrationOrchestrator>,
        audit: Arc<AuditLog>,
        pricing: PricingConfig,
    ) -> Self {
        Self {
            directory,
            approvals,
            integrations,
            audit,
            pricing,
        }
    }

    pub fn overview(&self) -> OverviewMetrics {
        let now = Utc::now();
        let month_start = month_start(now);
        let all_tenants = self.directory.list_tenants();

        let mut by_status = StatusBreakdown::default();
        let mut by_tier = TierBreakdown::default();
        let mut deleted = 0u64;
        let mut new_this_month = 0u64;
        let mut churned_this_month = 0u64;

        for t in &all_tenants {
            match t.status {
                SubscriptionStatus::Trial => by_status.trial += 1,
                SubscriptionStatus::Active => by_status.active += 1,
                SubscriptionStatus::Suspended => by_status.suspended += 1,
                SubscriptionStatus::Cancelled => by_status.cancelled += 1,
            }
            match t.tier {
                SubscriptionTier::Starter => by_tier.starter += 1,
                SubscriptionTier::Professional => by_tier.professional += 1,
                SubscriptionTier::Enterprise => by_tier.enterprise += 1,
            }
            if t.created_at >= month_start {
                new_this_month += 1;
            }
            if let Some(at) = t.deleted_at {
                deleted += 1;
                if at >= month_start {
                    churned_this_month += 1;
                }
            }
        }

        OverviewMetrics {
            total_tenants: all_tenants.len() as u64,
            by_status,
            by_tier,
            deleted_tenants: deleted,
            new_this_month,
            churned_this_month,
            estimated_mrr: self.tier_revenue(&all_tenants).iter().map(|r| r.mrr).sum(),
            generated_at: now,
        }
    }

    pub fn revenue(&self) -> RevenueMetrics {
        let tiers = self.tier_revenue(&self.directory.list_tenants());
        let mrr: f64 = tiers.iter().map(|r| r.mrr).sum();
        RevenueMetrics {
            tiers,
            mrr,
            arr: mrr * 12.0,
            is_estimate: true,
            generated_at: Utc::now(),
        }
    }

    /// Paying tenants are active and not deleted; trials pay nothing.
    fn tier_revenue(&self, tenants: &[Tenant]) -> Vec<TierRevenue> {
        SubscriptionTier::ALL
            .iter()
            .map(|&tier| {
                let active_tenants = tenants
                    .iter()
                    .filter(|t| {
                        t.tier == tier && t.status == SubscriptionStatus::Active && !t.is_deleted()
                    })
                    .count() as u64;
                let monthly_price = self.pricing.monthly_price(tier);
                TierRevenue {
                    tier,
                    active_tenants,
                    monthly_price,
                    mrr: active_tenants as f64 * monthly_price,
                }
            })
            .collect()
    }

    pub async fn system_health(&self) -> SystemHealth {
        let integrations = self.integrations.health_counts();
        let audit = self.audit.verify_chain();
        let status = if audit.chain_intact && integrations.down == 0 {
            "ok"
        } else {
            "degraded"
        };
        SystemHealth {
            status,
            integrations,
            in_flight_sync_jobs: self.integrations.in_flight_count(),
            pending_approvals: self.approvals.pending_count().await,
            audit,
            generated_at: Utc::now(),
        }
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant_ops::{CreateTenantRequest, TenantOps, DELETE_CONFIRMATION};
    use controlplane_approvals::{AutoApprovalPolicy, TenantChangeApplier};
    use controlplane_core::config::{ApprovalConfig, IntegrationConfig};
    use controlplane_core::types::CallerIdentity;
    use controlplane_integrations::{ChannelQueue, ProbeResult, StaticProbe};
    use controlplane_platform::NamespaceStore;
    use uuid::Uuid;

    struct Fixture {
        ops: TenantOps,
        dashboard: ProviderDashboard,
        operator: CallerIdentity,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(TenantDirectory::new());
        let namespaces = Arc::new(NamespaceStore::new());
        let audit = Arc::new(AuditLog::new());
        let approvals = Arc::new(ApprovalEngine::new(
            AutoApprovalPolicy::from_config(&ApprovalConfig::default()),
            Arc::new(TenantChangeApplier::new(directory.clone(), namespaces.clone())),
            audit.clone(),
        ));
        let (queue, _receiver) = ChannelQueue::new(8);
        let integrations = Arc::new(IntegrationOrchestrator::new(
            &IntegrationConfig::default(),
            Arc::new(StaticProbe::new(ProbeResult::Reachable)),
            Arc::new(queue),
            audit.clone(),
        ));
        Fixture {
            ops: TenantOps::new(directory.clone(), namespaces, audit.clone(), "tenant_"),
            dashboard: ProviderDashboard::new(
                directory,
                approvals,
                integrations,
                audit,
                PricingConfig::default(),
            ),
            operator: CallerIdentity {
                user_id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                platform_operator: true,
            },
        }
    }

    fn create(f: &Fixture, slug: &str, tier: SubscriptionTier) -> Uuid {
        f.ops
            .create_tenant(
                &f.operator,
                CreateTenantRequest {
                    name: Some(slug.to_uppercase()),
                    slug: Some(slug.into()),
                    owner_email: Some(format!("owner@{slug}.test")),
                    tier: Some(tier),
                    idp_org_ref: None,
                },
            )
            .unwrap()
            .tenant
            .id
    }

    #[test]
    fn test_overview_counts_and_churn() {
        let f = fixture();
        create(&f, "acme", SubscriptionTier::Professional);
        create(&f, "globex", SubscriptionTier::Enterprise);
        let initech = create(&f, "initech", SubscriptionTier::Starter);
        let hooli = create(&f, "hooli", SubscriptionTier::Starter);
        f.ops.suspend(&f.operator, initech, "chargeback").unwrap();
        f.ops.delete(&f.operator, hooli, Some(DELETE_CONFIRMATION)).unwrap();

        let overview = f.dashboard.overview();
        assert_eq!(overview.total_tenants, 4);
        assert_eq!(overview.by_status.active, 2);
        assert_eq!(overview.by_status.suspended, 1);
        assert_eq!(overview.by_status.cancelled, 1);
        assert_eq!(overview.by_tier.starter, 2);
        assert_eq!(overview.new_this_month, 4);
        assert_eq!(overview.churned_this_month, 1);
        assert_eq!(overview.deleted_tenants, 1);
        assert_eq!(overview.estimated_mrr, 149.0 + 499.0);
    }

    #[test]
    fn test_revenue_uses_price_table() {
        let f = fixture();
        create(&f, "acme", SubscriptionTier::Professional);
        create(&f, "umbrella", SubscriptionTier::Professional);
        f.ops
            .signup(CreateTenantRequest {
                name: Some("Trial Co".into()),
                slug: Some("trial-co".into()),
                owner_email: Some("owner@trial.test".into()),
                tier: Some(SubscriptionTier::Enterprise),
                idp_org_ref: None,
            })
            .unwrap();

        let revenue = f.dashboard.revenue();
        assert!(revenue.is_estimate);
        assert_eq!(revenue.mrr, 298.0);
        assert_eq!(revenue.arr, 298.0 * 12.0);
        let pro = revenue
            .tiers
            .iter()
            .find(|r| r.tier == SubscriptionTier::Professional)
            .unwrap();
        assert_eq!(pro.active_tenants, 2);
    }

    #[tokio::test]
    async fn test_system_health_reports_intact_chain() {
        let f = fixture();
        create(&f, "acme", SubscriptionTier::Starter);
        let health = f.dashboard.system_health().await;
        assert_eq!(health.status, "ok");
        assert!(health.audit.chain_intact);
        assert_eq!(health.pending_approvals, 0);
        assert_eq!(health.integrations.total(), 0);
    }
}
