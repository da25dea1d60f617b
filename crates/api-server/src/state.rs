//! Shared handler state. Every component is built once here and handed out
//! as an `Arc`; nothing is global.

use controlplane_admin::{ImpersonationService, ProviderDashboard, TenantOps};
use controlplane_approvals::{ApprovalEngine, AutoApprovalPolicy, TenantChangeApplier};
use controlplane_core::config::AppConfig;
use controlplane_integrations::{ConnectionProbe, IntegrationOrchestrator, SyncQueue};
use controlplane_platform::{
    AuditLog, ImpersonationSigner, MfaVerifier, NamespaceStore, SessionStore, TenantDirectory,
    TenantResolver,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub start_time: Instant,
    pub directory: Arc<TenantDirectory>,
    pub namespaces: Arc<NamespaceStore>,
    pub audit: Arc<AuditLog>,
    pub sessions: Arc<SessionStore>,
    pub resolver: Arc<TenantResolver>,
    pub mfa: Arc<MfaVerifier>,
    pub approvals: Arc<ApprovalEngine>,
    pub integrations: Arc<IntegrationOrchestrator>,
    pub tenants: Arc<TenantOps>,
    pub dashboard: Arc<ProviderDashboard>,
    pub impersonation: Arc<ImpersonationService>,
}

impl AppState {
    /// Wire every component from configuration. The probe and queue are the
    /// integration seams and are supplied by the caller.
    pub fn build(
        config: &AppConfig,
        probe: Arc<dyn ConnectionProbe>,
        queue: Arc<dyn SyncQueue>,
    ) -> Self {
        let directory = Arc::new(TenantDirectory::new());
        let namespaces = Arc::new(NamespaceStore::new());
        let audit = Arc::new(AuditLog::new());
        let prefix = config.tenancy.namespace_prefix.clone();

        let approvals = Arc::new(ApprovalEngine::new(
            AutoApprovalPolicy::from_config(&config.approvals),
            Arc::new(TenantChangeApplier::new(directory.clone(), namespaces.clone())),
            audit.clone(),
        ));
        let integrations = Arc::new(IntegrationOrchestrator::new(
            &config.integrations,
            probe,
            queue,
            audit.clone(),
        ));
        let tenants = Arc::new(TenantOps::new(
            directory.clone(),
            namespaces.clone(),
            audit.clone(),
            prefix.clone(),
        ));
        let dashboard = Arc::new(ProviderDashboard::new(
            directory.clone(),
            approvals.clone(),
            integrations.clone(),
            audit.clone(),
            config.pricing.clone(),
        ));
        let impersonation = Arc::new(ImpersonationService::new(
            directory.clone(),
            ImpersonationSigner::from_config(&config.auth),
            audit.clone(),
        ));

        Self {
            node_id: config.node_id.clone(),
            start_time: Instant::now(),
            sessions: Arc::new(SessionStore::new(config.auth.session_ttl_hours)),
            resolver: Arc::new(TenantResolver::new(directory.clone(), prefix)),
            mfa: Arc::new(MfaVerifier::new(directory.clone(), &config.auth)),
            directory,
            namespaces,
            audit,
            approvals,
            integrations,
            tenants,
            dashboard,
            impersonation,
        }
    }
}
