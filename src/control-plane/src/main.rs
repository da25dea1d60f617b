//! Control Plane: multi-tenant SaaS admin backend.
//!
//! Main entry point that wires all components and starts the servers.

use clap::Parser;
use controlplane_admin::tenant_ops::CreateTenantRequest;
use controlplane_api::{ApiServer, AppState};
use controlplane_core::config::AppConfig;
use controlplane_core::types::{CallerIdentity, SubscriptionTier, User, UserRole};
use controlplane_integrations::{
    spawn_scheduler, ChannelQueue, ConnectorExecutor, HttpProbe, SyncWorker,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "control-plane")]
#[command(about = "Multi-tenant admin control plane")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CONTROL_PLANE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "CONTROL_PLANE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "CONTROL_PLANE__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Provision demo tenants and log session tokens for them
    #[arg(long, env = "CONTROL_PLANE__SEED_DEMO", default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "control_plane=info,controlplane=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Control plane starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        sync_workers = config.integrations.sync_workers,
        "Configuration loaded"
    );

    let probe = Arc::new(HttpProbe::new(Duration::from_millis(
        config.integrations.check_timeout_ms,
    )));
    let (queue, receiver) = ChannelQueue::new(config.integrations.queue_capacity);
    let state = AppState::build(&config, probe.clone(), Arc::new(queue));

    if !state.impersonation.is_enabled() {
        warn!("No impersonation signing key configured; impersonation is disabled");
    }

    // Background sync processing
    SyncWorker::new(
        state.integrations.clone(),
        Arc::new(ConnectorExecutor::new(probe)),
        config.integrations.sync_workers,
    )
    .spawn(receiver);

    let directory = state.directory.clone();
    spawn_scheduler(
        state.integrations.clone(),
        Duration::from_secs(config.integrations.schedule_interval_secs.max(1)),
        Arc::new(move |tenant_id: Uuid| {
            directory
                .get_tenant(tenant_id)
                .map(|t| !t.is_deleted() && t.status.allows_writes())
                .unwrap_or(false)
        }),
    );

    if cli.seed_demo {
        seed_demo(&state)?;
    }

    let api_server = ApiServer::new(config, state);

    if let Err(e) = api_server.start_metrics() {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("Control plane is ready to serve traffic");

    // Blocks until shutdown
    api_server.start_http().await?;

    Ok(())
}

/// Provision two demo tenants and print bearer tokens for local use.
fn seed_demo(state: &AppState) -> anyhow::Result<()> {
    let (operator_token, operator_session) = state.sessions.create_session(Uuid::new_v4(), true);
    let operator = CallerIdentity {
        user_id: operator_session.user_id,
        session_id: operator_session.session_id,
        platform_operator: true,
    };
    info!(token = %operator_token, "Demo platform operator session");

    for (name, slug, tier) in [
        ("Acme Corp", "acme", SubscriptionTier::Professional),
        ("Globex", "globex", SubscriptionTier::Starter),
    ] {
        let provisioned = state.tenants.create_tenant(
            &operator,
            CreateTenantRequest {
                name: Some(name.to_string()),
                slug: Some(slug.to_string()),
                owner_email: Some(format!("owner@{slug}.test")),
                tier: Some(tier),
                idp_org_ref: None,
            },
        )?;
        let tenant = provisioned.tenant;
        let (owner_token, _) = state.sessions.create_session(provisioned.owner.id, false);

        let admin = User::new(tenant.id, format!("admin@{slug}.test"), UserRole::Admin);
        let admin_id = admin.id;
        state.directory.insert_user(admin);
        let (admin_token, _) = state.sessions.create_session(admin_id, false);

        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            tier = %tenant.tier,
            owner_token = %owner_token,
            admin_token = %admin_token,
            "Demo tenant seeded"
        );
    }

    Ok(())
}
