//! Hand-off of queued sync jobs to background execution.

use async_trait::async_trait;
use controlplane_core::{ControlPlaneError, ControlPlaneResult};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::model::SyncJob;

/// Message carried from the orchestrator to the worker.
#[derive(Debug, Clone)]
pub struct QueuedSync {
    pub job_id: Uuid,
    pub integration_id: Uuid,
    pub tenant_id: Uuid,
}

/// Execution substrate for sync jobs. Returns the queue's own handle for
/// the job.
#[async_trait]
pub trait SyncQueue: Send + Sync {
    async fn enqueue(&self, job: &SyncJob) -> ControlPlaneResult<String>;
}

/// In-process bounded channel feeding a [`crate::worker::SyncWorker`].
pub struct ChannelQueue {
    sender: mpsc::Sender<QueuedSync>,
    seq: AtomicU64,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedSync>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                seq: AtomicU64::new(0),
            },
            receiver,
        )
    }
}

#[async_trait]
impl SyncQueue for ChannelQueue {
    async fn enqueue(&self, job: &SyncJob) -> ControlPlaneResult<String> {
        let message = QueuedSync {
            job_id: job.id,
            integration_id: job.integration_id,
            tenant_id: job.tenant_id,
        };
        match self.sender.try_send(message) {
            Ok(()) => {
                let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("sync.queued").increment(1);
                Ok(format!("local-{n}"))
            }
            Err(e) => {
                metrics::counter!("sync.dropped").increment(1);
                warn!(job_id = %job.id, error = %e, "Sync job could not be queued");
                Err(ControlPlaneError::internal(format!("sync queue unavailable: {e}")))
            }
        }
    }
}
