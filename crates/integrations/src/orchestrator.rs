//! Per-tenant integration registry, health checks, and sync scheduling.
//!
//! Two serialization points:
//! - at most one queued-or-running sync per (tenant, integration), claimed
//!   with a single compare-and-set on the in-flight map;
//! - health checks on the same integration run one at a time behind a
//!   per-integration async mutex.

use chrono::{Duration as ChronoDuration, Utc};
use controlplane_core::config::IntegrationConfig;
use controlplane_core::types::{TenantContext, UNLIMITED};
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use controlplane_platform::{AuditLog, AuditRecord};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{
    ErrorRateSummary, HealthCheck, HealthCounts, HealthSnapshot, HealthStatus, Integration,
    IntegrationFilter, IntegrationHealth, NewIntegration, SyncJob, SyncJobStatus, SyncSummary,
    SyncTrigger,
};
use crate::probe::{classify, ConnectionProbe, ProbeResult};
use crate::queue::SyncQueue;

/// Feature-map entry holding the tier's integration allowance.
const INTEGRATIONS_FEATURE: &str = "integrations";

pub struct IntegrationOrchestrator {
    integrations: DashMap<Uuid, Integration>,
    jobs: DashMap<Uuid, SyncJob>,
    /// (tenant, integration) -> queued or running job
    in_flight: DashMap<(Uuid, Uuid), Uuid>,
    check_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Serializes the limit count and insert of registrations per tenant.
    registration_locks: DashMap<Uuid, Arc<parking_lot::Mutex<()>>>,
    checks: RwLock<Vec<HealthCheck>>,
    probe: Arc<dyn ConnectionProbe>,
    queue: Arc<dyn SyncQueue>,
    audit: Arc<AuditLog>,
    healthy_bound: Duration,
    check_timeout: Duration,
}

impl IntegrationOrchestrator {
    pub fn new(
        config: &IntegrationConfig,
        probe: Arc<dyn ConnectionProbe>,
        queue: Arc<dyn SyncQueue>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            integrations: DashMap::new(),
            jobs: DashMap::new(),
            in_flight: DashMap::new(),
            check_locks: DashMap::new(),
            registration_locks: DashMap::new(),
            checks: RwLock::new(Vec::new()),
            probe,
            queue,
            audit,
            healthy_bound: Duration::from_millis(config.healthy_latency_ms),
            check_timeout: Duration::from_millis(config.check_timeout_ms.max(1)),
        }
    }

    // ── Registry ────────────────────────────────────────────────────────

    pub fn register(
        &self,
        ctx: &TenantContext,
        input: NewIntegration,
    ) -> ControlPlaneResult<Integration> {
        let (name, integration_type) = input.validate()?;

        let lock = self
            .registration_locks
            .entry(ctx.tenant_id())
            .or_default()
            .clone();
        let _registering = lock.lock();

        let allowance = ctx
            .tenant()
            .feature(INTEGRATIONS_FEATURE)
            .map_or(0, |v| v.limit());
        let existing = self
            .integrations
            .iter()
            .filter(|e| e.value().tenant_id == ctx.tenant_id())
            .count() as i64;
        if allowance == 0 || (allowance != UNLIMITED && existing >= allowance) {
            return Err(ControlPlaneError::FeatureNotAvailable {
                feature: INTEGRATIONS_FEATURE.to_string(),
            });
        }

        let integration = Integration {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id(),
            name,
            integration_type,
            endpoint: input.endpoint,
            credentials_ref: input.credentials_ref,
            is_active: true,
            health_status: HealthStatus::Unknown,
            last_checked_at: None,
            last_latency_ms: None,
            last_error: None,
            created_at: Utc::now(),
        };
        self.integrations.insert(integration.id, integration.clone());
        self.audit.append(
            AuditRecord::new("integration.registered", "integration", integration.id)
                .tenant(ctx.tenant_id())
                .actor(ctx.caller().actor())
                .metadata(json!({ "type": integration.integration_type, "name": integration.name })),
        );
        info!(
            tenant_id = %ctx.tenant_id(),
            integration_id = %integration.id,
            "Integration registered"
        );
        Ok(integration)
    }

    /// The integration if it belongs to the caller's tenant.
    pub fn get(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<Integration> {
        self.integrations
            .get(&id)
            .map(|e| e.value().clone())
            .filter(|i| i.tenant_id == ctx.tenant_id())
            .ok_or_else(|| ControlPlaneError::not_found("integration", id))
    }

    pub fn list(&self, ctx: &TenantContext, filter: &IntegrationFilter) -> Vec<Integration> {
        let mut out: Vec<Integration> = self
            .integrations
            .iter()
            .filter(|e| e.value().tenant_id == ctx.tenant_id() && filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    // ── Health ──────────────────────────────────────────────────────────

    /// Run a live check now and persist the outcome, whatever it is.
    pub async fn test_connection(
        &self,
        ctx: &TenantContext,
        id: Uuid,
    ) -> ControlPlaneResult<HealthSnapshot> {
        self.get(ctx, id)?;
        let lock = self.check_locks.entry(id).or_default().clone();
        let _serial = lock.lock().await;

        let integration = self.get(ctx, id)?;
        let started = Instant::now();
        let result = match tokio::time::timeout(self.check_timeout, self.probe.check(&integration))
            .await
        {
            Ok(result) => result,
            Err(_) => ProbeResult::Failed(format!(
                "health check timed out after {}ms",
                self.check_timeout.as_millis()
            )),
        };
        let latency = started.elapsed();
        let status = classify(&result, latency, self.healthy_bound);
        let error = match &result {
            ProbeResult::Partial(msg) | ProbeResult::Failed(msg) => Some(msg.clone()),
            ProbeResult::Reachable if status == HealthStatus::Degraded => Some(format!(
                "latency {}ms exceeded {}ms",
                latency.as_millis(),
                self.healthy_bound.as_millis()
            )),
            ProbeResult::Reachable => None,
        };

        let now = Utc::now();
        let latency_ms = latency.as_millis() as u64;
        let snapshot = {
            let mut entry = self
                .integrations
                .get_mut(&id)
                .ok_or_else(|| ControlPlaneError::not_found("integration", id))?;
            entry.health_status = status;
            entry.last_checked_at = Some(now);
            entry.last_latency_ms = Some(latency_ms);
            entry.last_error = error.clone();
            HealthSnapshot::from(&*entry)
        };

        {
            let mut checks = self.checks.write();
            let horizon = now - ChronoDuration::days(1);
            checks.retain(|c| c.checked_at >= horizon);
            checks.push(HealthCheck {
                integration_id: id,
                tenant_id: integration.tenant_id,
                status,
                latency_ms,
                error: error.clone(),
                checked_at: now,
            });
        }

        metrics::counter!("integrations.health_checks", "status" => status.as_str()).increment(1);
        if status == HealthStatus::Healthy {
            debug!(integration_id = %id, latency_ms, "Health check passed");
        } else {
            warn!(
                integration_id = %id,
                status = status.as_str(),
                latency_ms,
                error = error.as_deref().unwrap_or(""),
                "Integration not healthy"
            );
        }
        self.audit.append(
            AuditRecord::new("integration.tested", "integration", id)
                .tenant(ctx.tenant_id())
                .actor(ctx.caller().actor())
                .metadata(json!({ "status": status, "latencyMs": latency_ms })),
        );
        Ok(snapshot)
    }

    /// Latest stored health plus rolling error rates.
    pub fn integration_health(
        &self,
        ctx: &TenantContext,
        id: Uuid,
    ) -> ControlPlaneResult<IntegrationHealth> {
        let integration = self.get(ctx, id)?;
        let now = Utc::now();
        let hour_ago = now - ChronoDuration::hours(1);
        let day_ago = now - ChronoDuration::days(1);

        let mut summary = ErrorRateSummary::default();
        for check in self.checks.read().iter().filter(|c| c.integration_id == id) {
            let failed = check.status == HealthStatus::Down;
            if check.checked_at >= hour_ago {
                summary.checks_last_hour += 1;
                if failed {
                    summary.failed_checks_last_hour += 1;
                }
            }
            if failed && check.checked_at >= day_ago {
                summary.failed_checks_last_day += 1;
            }
        }
        summary.failed_syncs_last_day = self
            .jobs
            .iter()
            .filter(|e| {
                let job = e.value();
                job.integration_id == id
                    && job.status == SyncJobStatus::Failed
                    && job.completed_at.is_some_and(|t| t >= day_ago)
            })
            .count();
        if summary.checks_last_hour > 0 {
            summary.error_rate_last_hour =
                summary.failed_checks_last_hour as f64 / summary.checks_last_hour as f64;
        }

        Ok(IntegrationHealth {
            snapshot: HealthSnapshot::from(&integration),
            is_active: integration.is_active,
            error_rate: summary,
        })
    }

    // ── Sync ────────────────────────────────────────────────────────────

    /// Queue a manual sync. Conflicts if one is already queued or running.
    /// Pausing only stops scheduled triggers; manual syncs still run.
    pub async fn sync_integration(
        &self,
        ctx: &TenantContext,
        id: Uuid,
    ) -> ControlPlaneResult<SyncJob> {
        let integration = self.get(ctx, id)?;
        let job = self
            .enqueue_sync(&integration, SyncTrigger::Manual, Some(ctx.user_id()))
            .await?;
        self.audit.append(
            AuditRecord::new("integration.sync_requested", "integration", id)
                .tenant(ctx.tenant_id())
                .actor(ctx.caller().actor())
                .metadata(json!({ "jobId": job.id, "queueJobId": job.queue_job_id })),
        );
        Ok(job)
    }

    async fn enqueue_sync(
        &self,
        integration: &Integration,
        trigger: SyncTrigger,
        triggered_by: Option<Uuid>,
    ) -> ControlPlaneResult<SyncJob> {
        let slot = (integration.tenant_id, integration.id);
        let mut job = SyncJob {
            id: Uuid::new_v4(),
            integration_id: integration.id,
            tenant_id: integration.tenant_id,
            triggered_by,
            trigger,
            status: SyncJobStatus::Queued,
            queue_job_id: None,
            summary: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        match self.in_flight.entry(slot) {
            Entry::Occupied(current) => {
                let existing = *current.get();
                metrics::counter!("sync.rejected").increment(1);
                return Err(ControlPlaneError::conflict_with(
                    "a sync is already queued or running for this integration",
                    existing,
                ));
            }
            Entry::Vacant(free) => {
                self.jobs.insert(job.id, job.clone());
                free.insert(job.id);
            }
        }

        match self.queue.enqueue(&job).await {
            Ok(handle) => {
                if let Some(mut stored) = self.jobs.get_mut(&job.id) {
                    stored.queue_job_id = Some(handle.clone());
                    job = stored.clone();
                }
                info!(
                    tenant_id = %job.tenant_id,
                    integration_id = %job.integration_id,
                    job_id = %job.id,
                    queue_job_id = %handle,
                    "Sync job queued"
                );
                Ok(job)
            }
            Err(e) => {
                self.jobs.remove(&job.id);
                self.in_flight.remove_if(&slot, |_, held| *held == job.id);
                Err(e)
            }
        }
    }

    pub fn pause(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<Integration> {
        self.set_active(ctx, id, false)
    }

    pub fn resume(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<Integration> {
        self.set_active(ctx, id, true)
    }

    /// Toggle the active flag. In-flight jobs are left alone.
    fn set_active(
        &self,
        ctx: &TenantContext,
        id: Uuid,
        active: bool,
    ) -> ControlPlaneResult<Integration> {
        self.get(ctx, id)?;
        let (changed, updated) = {
            let mut entry = self
                .integrations
                .get_mut(&id)
                .ok_or_else(|| ControlPlaneError::not_found("integration", id))?;
            let changed = entry.is_active != active;
            entry.is_active = active;
            (changed, entry.clone())
        };
        if changed {
            let action = if active { "integration.resumed" } else { "integration.paused" };
            self.audit.append(
                AuditRecord::new(action, "integration", id)
                    .tenant(ctx.tenant_id())
                    .actor(ctx.caller().actor()),
            );
            info!(integration_id = %id, active, "Integration active flag changed");
        }
        Ok(updated)
    }

    /// Sync jobs for one integration, newest first.
    pub fn jobs_for(&self, ctx: &TenantContext, id: Uuid) -> ControlPlaneResult<Vec<SyncJob>> {
        self.get(ctx, id)?;
        let mut jobs: Vec<SyncJob> = self
            .jobs
            .iter()
            .filter(|e| e.value().integration_id == id)
            .map(|e| e.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    pub fn job(&self, job_id: Uuid) -> Option<SyncJob> {
        self.jobs.get(&job_id).map(|e| e.value().clone())
    }

    // ── Worker callbacks ────────────────────────────────────────────────

    /// Move a queued job to running. Returns `None` if the job is gone or
    /// not queued.
    pub fn mark_running(&self, job_id: Uuid) -> Option<(SyncJob, Integration)> {
        let job = {
            let mut entry = self.jobs.get_mut(&job_id)?;
            if entry.status != SyncJobStatus::Queued {
                return None;
            }
            entry.status = SyncJobStatus::Running;
            entry.started_at = Some(Utc::now());
            entry.clone()
        };
        let integration = self.integrations.get(&job.integration_id)?.value().clone();
        Some((job, integration))
    }

    /// Record a job's outcome and release its in-flight slot.
    pub fn complete_job(
        &self,
        job_id: Uuid,
        outcome: Result<SyncSummary, String>,
    ) -> Option<SyncJob> {
        let job = {
            let mut entry = self.jobs.get_mut(&job_id)?;
            if !entry.status.is_in_flight() {
                return Some(entry.clone());
            }
            entry.completed_at = Some(Utc::now());
            match outcome {
                Ok(summary) => {
                    entry.status = SyncJobStatus::Succeeded;
                    entry.summary = Some(summary);
                }
                Err(e) => {
                    entry.status = SyncJobStatus::Failed;
                    entry.error = Some(e);
                }
            }
            entry.clone()
        };
        self.in_flight
            .remove_if(&(job.tenant_id, job.integration_id), |_, held| *held == job_id);

        let outcome = if job.status == SyncJobStatus::Succeeded { "succeeded" } else { "failed" };
        metrics::counter!("sync.completed", "outcome" => outcome).increment(1);
        info!(
            job_id = %job.id,
            integration_id = %job.integration_id,
            outcome,
            "Sync job finished"
        );
        Some(job)
    }

    // ── Scheduling & aggregates ─────────────────────────────────────────

    /// Queue a scheduled sync for every active integration whose tenant
    /// passes `eligible`. Integrations with a sync in flight are skipped.
    pub async fn run_scheduled_syncs(
        &self,
        eligible: &(dyn Fn(Uuid) -> bool + Send + Sync),
    ) -> usize {
        let candidates: Vec<Integration> = self
            .integrations
            .iter()
            .filter(|e| e.value().is_active)
            .map(|e| e.value().clone())
            .collect();

        let mut queued = 0;
        for integration in candidates {
            if !eligible(integration.tenant_id) {
                continue;
            }
            match self.enqueue_sync(&integration, SyncTrigger::Scheduled, None).await {
                Ok(_) => queued += 1,
                Err(ControlPlaneError::Conflict { .. }) => {
                    debug!(integration_id = %integration.id, "Scheduled sync skipped, one in flight");
                }
                Err(e) => {
                    warn!(integration_id = %integration.id, error = %e, "Scheduled sync not queued");
                }
            }
        }
        queued
    }

    pub fn health_counts(&self) -> HealthCounts {
        let mut counts = HealthCounts::default();
        for entry in self.integrations.iter() {
            counts.record(entry.value().health_status);
        }
        counts
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
