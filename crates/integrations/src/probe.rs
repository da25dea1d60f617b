//! Live reachability checks against external systems.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::model::{HealthStatus, Integration};

/// Raw outcome of one probe, before latency classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    /// Answered, but not fully (partial content, redirects, throttling).
    Partial(String),
    Failed(String),
}

#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn check(&self, integration: &Integration) -> ProbeResult;
}

/// Map a probe outcome and its latency onto a health status.
pub fn classify(result: &ProbeResult, latency: Duration, healthy_bound: Duration) -> HealthStatus {
    match result {
        ProbeResult::Reachable if latency <= healthy_bound => HealthStatus::Healthy,
        ProbeResult::Reachable | ProbeResult::Partial(_) => HealthStatus::Degraded,
        ProbeResult::Failed(_) => HealthStatus::Down,
    }
}

/// Issues a GET against the integration's endpoint.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl ConnectionProbe for HttpProbe {
    async fn check(&self, integration: &Integration) -> ProbeResult {
        let Some(endpoint) = integration.endpoint.as_deref() else {
            return ProbeResult::Failed("no endpoint configured".into());
        };

        match self.client.get(endpoint).send().await {
            Ok(resp) => {
                let status = resp.status();
                debug!(integration_id = %integration.id, status = status.as_u16(), "Probe answered");
                if status == reqwest::StatusCode::PARTIAL_CONTENT
                    || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    || status.is_redirection()
                {
                    ProbeResult::Partial(format!("endpoint answered {status}"))
                } else if status.is_success() {
                    ProbeResult::Reachable
                } else {
                    ProbeResult::Failed(format!("endpoint answered {status}"))
                }
            }
            Err(e) if e.is_timeout() => ProbeResult::Failed("request timed out".into()),
            Err(e) => ProbeResult::Failed(e.to_string()),
        }
    }
}

/// Fixed answers per integration, with optional artificial latency. Used for
/// mock integrations and in tests.
pub struct StaticProbe {
    default: ProbeResult,
    delay: Duration,
    overrides: DashMap<Uuid, (ProbeResult, Duration)>,
}

impl StaticProbe {
    pub fn new(default: ProbeResult) -> Self {
        Self {
            default,
            delay: Duration::ZERO,
            overrides: DashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set(&self, integration_id: Uuid, result: ProbeResult, delay: Duration) {
        self.overrides.insert(integration_id, (result, delay));
    }
}

#[async_trait]
impl ConnectionProbe for StaticProbe {
    async fn check(&self, integration: &Integration) -> ProbeResult {
        let (result, delay) = self
            .overrides
            .get(&integration.id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| (self.default.clone(), self.delay));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let bound = Duration::from_millis(500);
        assert_eq!(
            classify(&ProbeResult::Reachable, Duration::from_millis(20), bound),
            HealthStatus::Healthy
        );
        assert_eq!(
            classify(&ProbeResult::Reachable, Duration::from_millis(900), bound),
            HealthStatus::Degraded
        );
        assert_eq!(
            classify(&ProbeResult::Partial("206".into()), Duration::from_millis(5), bound),
            HealthStatus::Degraded
        );
        assert_eq!(
            classify(&ProbeResult::Failed("refused".into()), Duration::ZERO, bound),
            HealthStatus::Down
        );
    }
}
