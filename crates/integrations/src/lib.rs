//! External integration registry: connection health, error rates, and
//! per-integration sync jobs executed off the request path.

pub mod model;
pub mod orchestrator;
pub mod probe;
pub mod queue;
pub mod worker;

pub use model::{
    HealthCounts, HealthSnapshot, HealthStatus, Integration, IntegrationFilter, IntegrationHealth,
    IntegrationType, NewIntegration, SyncJob, SyncJobStatus, SyncSummary,
};
pub use orchestrator::IntegrationOrchestrator;
pub use probe::{ConnectionProbe, HttpProbe, ProbeResult, StaticProbe};
pub use queue::{ChannelQueue, QueuedSync, SyncQueue};
pub use worker::{spawn_scheduler, ConnectorExecutor, SyncExecutor, SyncWorker};
