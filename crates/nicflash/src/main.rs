//! nicflash daemon
//!
//! Runs on every node with FPGA network adapters. Watches the node's
//! `FirmwareNode` resource and flashes the requested adapters inside a
//! cluster-wide maintenance window.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use eyre::{WrapErr, eyre};
use kameo::actor::{ActorRef, Spawn};
use nicflash_api::{FirmwareCluster, FirmwareNode};
use nicflash_core::{NodeReconcilerActor, Reconcile, ReconcileOutcome};
use nicflash_kube::{ClusterSync, KubeClient};
use nicflash_maintenance::CancelHandle;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use config::Config;
use factory::NodeOptions;
use state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Per-node NIC firmware update daemon
#[derive(Debug, Parser)]
#[command(name = "nicflash", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (default: search NICFLASH_CONFIG and the usual paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Node this daemon manages
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Namespace of the FirmwareNode resources and the lease
    #[arg(long, env = "NICFLASH_NAMESPACE", default_value = "default", global = true)]
    namespace: String,

    /// Probe server address (overrides the config file)
    #[arg(long)]
    probe_bind: Option<String>,

    /// Log tool invocations instead of running them
    #[arg(long)]
    dry_run_tools: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// API server URL replacing the inferred one (e.g. `kubectl proxy`)
    #[arg(long, env = "NICFLASH_API_SERVER", global = true)]
    api_server: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Split the FirmwareCluster resource into per-node resources
    #[command(name = "sync-cluster")]
    SyncCluster {
        /// Name of the FirmwareCluster resource to honour
        #[arg(long, default_value = FirmwareCluster::DEFAULT_NAME)]
        name: String,
    },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).wrap_err("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.wrap_err("failed to listen for SIGINT")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

/// Create an empty resource for this node so the inventory gets reported
async fn ensure_firmware_node(client: &KubeClient, namespace: &str, name: &str) -> Result<()> {
    if client.get_firmware_node(namespace, name).await?.is_some() {
        return Ok(());
    }
    match client
        .create_firmware_node(&FirmwareNode::for_node(name, namespace))
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.status() == Some(409) => {
            debug!("FirmwareNode created concurrently");
            Ok(())
        }
        Err(e) => Err(e).wrap_err("failed to create FirmwareNode"),
    }
}

/// Feed the latest resource to the reconciler every `interval`
async fn poll(
    client: KubeClient,
    reconciler: ActorRef<NodeReconcilerActor>,
    namespace: String,
    name: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let node = match client.get_firmware_node(&namespace, &name).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                warn!(namespace, name, "FirmwareNode not found, recreating");
                if let Err(e) = ensure_firmware_node(&client, &namespace, &name).await {
                    error!(error = %e, "failed to recreate FirmwareNode");
                }
                continue;
            }
            Err(e) => {
                error!(error = %e, "failed to fetch FirmwareNode");
                continue;
            }
        };

        match reconciler.ask(Reconcile { node }).await {
            Ok(ReconcileOutcome::Completed(condition)) => info!(
                status = ?condition.status,
                reason = ?condition.reason,
                message = %condition.message,
                "reconcile completed"
            ),
            Ok(ReconcileOutcome::Interrupted) => info!("update interrupted by shutdown"),
            Ok(outcome) => debug!(?outcome, "nothing to reconcile"),
            Err(e) => error!(error = %e, "reconcile failed"),
        }
    }
}

/// Keep the node resources in line with the cluster resource until signalled
async fn run_cluster_sync(
    client: KubeClient,
    namespace: String,
    name: String,
    interval: Duration,
) -> Result<()> {
    info!(%namespace, %name, "FirmwareCluster sync starting");
    let sync = ClusterSync::new(client, namespace).with_name(name);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(e) = sync.sync_all().await {
                    error!(error = %e, "FirmwareCluster sync failed");
                }
            }
        }
    }
}

async fn run_node(cli: Cli, config: Config, client: KubeClient) -> Result<()> {
    let node_name = cli
        .node_name
        .ok_or_else(|| eyre!("--node-name or NODE_NAME is required"))?;
    info!(node = %node_name, namespace = %cli.namespace, "nicflash daemon starting");
    ensure_firmware_node(&client, &cli.namespace, &node_name).await?;

    let shutdown = CancelHandle::new();
    let options = NodeOptions {
        node_name,
        namespace: cli.namespace,
        dry_run_tools: cli.dry_run_tools,
        shutdown: shutdown.signal(),
    };
    let reconciler =
        NodeReconcilerActor::spawn(factory::reconciler_args(&config, &client, &options)?);

    let bind = cli
        .probe_bind
        .unwrap_or_else(|| config.daemon.probe_bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind probe server to {bind}"))?;
    info!(%bind, "probe server listening");
    let app = router::create_router(Arc::new(AppState::new(reconciler.clone())));
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let poller = tokio::spawn(poll(
        client,
        reconciler.clone(),
        options.namespace,
        options.node_name,
        config.poll_interval(),
    ));

    shutdown_signal().await?;
    info!("shutting down");

    // a campaign still waiting for the window gives up; a flash in progress
    // runs to completion before the actor stops
    shutdown.cancel();
    poller.abort();
    reconciler.stop_gracefully().await.ok();
    reconciler.wait_for_shutdown().await;
    server.abort();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let mut cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => Config::load_default()?,
    };
    init_tracing(&config.daemon.log_level, cli.log_format);

    let client = KubeClient::infer(cli.api_server.as_deref())
        .await
        .wrap_err("failed to configure Kubernetes client")?;

    match cli.command.take() {
        Some(Command::SyncCluster { name }) => {
            run_cluster_sync(client, cli.namespace, name, config.poll_interval()).await
        }
        None => run_node(cli, config, client).await,
    }
}
