//! Background execution of queued sync jobs and the periodic scheduler.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Integration, SyncJob, SyncSummary};
use crate::orchestrator::IntegrationOrchestrator;
use crate::probe::{ConnectionProbe, ProbeResult};
use crate::queue::QueuedSync;

/// Runs one sync against the external system.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn execute(&self, integration: &Integration, job: &SyncJob) -> Result<SyncSummary, String>;
}

/// Default executor: confirms the remote side answers before reporting the
/// run. Record transfer itself belongs to connector-specific executors.
pub struct ConnectorExecutor {
    probe: Arc<dyn ConnectionProbe>,
}

impl ConnectorExecutor {
    pub fn new(probe: Arc<dyn ConnectionProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl SyncExecutor for ConnectorExecutor {
    async fn execute(&self, integration: &Integration, job: &SyncJob) -> Result<SyncSummary, String> {
        let start = Instant::now();
        info!(
            connector = %integration.name,
            job_id = %job.id,
            "Starting integration sync"
        );

        match self.probe.check(integration).await {
            ProbeResult::Failed(reason) => Err(reason),
            ProbeResult::Reachable | ProbeResult::Partial(_) => Ok(SyncSummary {
                duration_ms: start.elapsed().as_millis() as u64,
                ..SyncSummary::default()
            }),
        }
    }
}

/// Drains the sync queue, running up to `concurrency` jobs at once.
pub struct SyncWorker {
    orchestrator: Arc<IntegrationOrchestrator>,
    executor: Arc<dyn SyncExecutor>,
    permits: Arc<Semaphore>,
}

impl SyncWorker {
    pub fn new(
        orchestrator: Arc<IntegrationOrchestrator>,
        executor: Arc<dyn SyncExecutor>,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            executor,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn spawn(self, mut receiver: mpsc::Receiver<QueuedSync>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Sync worker started");
            while let Some(message) = receiver.recv().await {
                let Ok(permit) = self.permits.clone().acquire_owned().await else {
                    break;
                };
                let orchestrator = self.orchestrator.clone();
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    run_job(&orchestrator, executor.as_ref(), message).await;
                    drop(permit);
                });
            }
            info!("Sync worker stopped");
        })
    }
}

async fn run_job(
    orchestrator: &IntegrationOrchestrator,
    executor: &dyn SyncExecutor,
    message: QueuedSync,
) {
    let Some((job, integration)) = orchestrator.mark_running(message.job_id) else {
        warn!(job_id = %message.job_id, "Queued sync no longer runnable, skipping");
        return;
    };
    debug!(job_id = %job.id, tenant_id = %message.tenant_id, "Sync job running");
    let outcome = executor.execute(&integration, &job).await;
    orchestrator.complete_job(job.id, outcome);
}

/// Queue scheduled syncs every `interval` for tenants passing `eligible`.
pub fn spawn_scheduler(
    orchestrator: Arc<IntegrationOrchestrator>,
    interval: Duration,
    eligible: Arc<dyn Fn(Uuid) -> bool + Send + Sync>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let queued = orchestrator.run_scheduled_syncs(eligible.as_ref()).await;
            if queued > 0 {
                info!(queued, "Scheduled syncs queued");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntegrationType, NewIntegration, SyncJobStatus};
    use crate::probe::StaticProbe;
    use crate::queue::ChannelQueue;
    use chrono::Utc;
    use controlplane_core::config::IntegrationConfig;
    use controlplane_core::types::{
        CallerIdentity, FeatureValue, SubscriptionStatus, SubscriptionTier, Tenant, TenantContext,
        User, UserRole, UNLIMITED,
    };
    use controlplane_platform::AuditLog;
    use std::collections::BTreeMap;

    fn ctx() -> TenantContext {
        let now = Utc::now();
        let mut features = BTreeMap::new();
        features.insert("integrations".to_string(), FeatureValue::Limit(UNLIMITED));
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Globex".into(),
            slug: "globex".into(),
            idp_org_ref: None,
            namespace: "tenant_globex_0002".into(),
            tier: SubscriptionTier::Enterprise,
            status: SubscriptionStatus::Active,
            features,
            max_users: UNLIMITED,
            max_entities: UNLIMITED,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let user = User::new(tenant.id, "it@globex.test", UserRole::Owner);
        let caller = CallerIdentity {
            user_id: user.id,
            session_id: Uuid::new_v4(),
            platform_operator: false,
        };
        TenantContext::new(tenant, user, caller)
    }

    async fn wait_for_terminal(o: &IntegrationOrchestrator, job_id: Uuid) -> SyncJobStatus {
        for _ in 0..200 {
            if let Some(job) = o.job(job_id) {
                if !job.status.is_in_flight() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never finished");
    }

    #[tokio::test]
    async fn test_worker_runs_queued_job_and_frees_slot() {
        let probe = Arc::new(StaticProbe::new(ProbeResult::Reachable));
        let (queue, receiver) = ChannelQueue::new(16);
        let orchestrator = Arc::new(IntegrationOrchestrator::new(
            &IntegrationConfig::default(),
            probe.clone(),
            Arc::new(queue),
            Arc::new(AuditLog::new()),
        ));
        SyncWorker::new(
            orchestrator.clone(),
            Arc::new(ConnectorExecutor::new(probe.clone())),
            2,
        )
        .spawn(receiver);

        let ctx = ctx();
        let ok = orchestrator
            .register(
                &ctx,
                NewIntegration {
                    name: Some("ERP".into()),
                    integration_type: Some(IntegrationType::Erp),
                    endpoint: Some("https://erp.example/health".into()),
                    credentials_ref: None,
                },
            )
            .unwrap();
        let broken = orchestrator
            .register(
                &ctx,
                NewIntegration {
                    name: Some("CRM".into()),
                    integration_type: Some(IntegrationType::Crm),
                    ..Default::default()
                },
            )
            .unwrap();
        probe.set(broken.id, ProbeResult::Failed("connection refused".into()), Duration::ZERO);

        let first = orchestrator.sync_integration(&ctx, ok.id).await.unwrap();
        assert_eq!(first.queue_job_id.as_deref(), Some("local-1"));
        let second = orchestrator.sync_integration(&ctx, broken.id).await.unwrap();

        assert_eq!(
            wait_for_terminal(&orchestrator, first.id).await,
            SyncJobStatus::Succeeded
        );
        assert_eq!(
            wait_for_terminal(&orchestrator, second.id).await,
            SyncJobStatus::Failed
        );
        assert_eq!(
            orchestrator.job(second.id).unwrap().error.as_deref(),
            Some("connection refused")
        );
        assert_eq!(orchestrator.in_flight_count(), 0);

        // Slot is free again.
        assert!(orchestrator.sync_integration(&ctx, ok.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_sync() {
        let probe = Arc::new(StaticProbe::new(ProbeResult::Reachable));
        let (queue, _receiver) = ChannelQueue::new(1);
        let orchestrator = IntegrationOrchestrator::new(
            &IntegrationConfig::default(),
            probe,
            Arc::new(queue),
            Arc::new(AuditLog::new()),
        );
        let ctx = ctx();
        let mut ids = Vec::new();
        for name in ["A", "B"] {
            ids.push(
                orchestrator
                    .register(
                        &ctx,
                        NewIntegration {
                            name: Some(name.into()),
                            integration_type: Some(IntegrationType::Other),
                            ..Default::default()
                        },
                    )
                    .unwrap()
                    .id,
            );
        }

        orchestrator.sync_integration(&ctx, ids[0]).await.unwrap();
        let err = orchestrator.sync_integration(&ctx, ids[1]).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(orchestrator.jobs_for(&ctx, ids[1]).unwrap().is_empty());
        assert_eq!(orchestrator.in_flight_count(), 1);
    }
}
