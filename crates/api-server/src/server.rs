//! API server: the admin REST surface plus the Prometheus exporter.

use controlplane_core::config::AppConfig;
use std::net::SocketAddr;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the HTTP REST server. Runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = build_router(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Install the global recorder and serve `/metrics` on a separate port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
