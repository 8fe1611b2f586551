//! Wires configuration, the cluster client and the local tools together

use std::sync::Arc;

use eyre::{Result, WrapErr};
use nicflash_artifact::HttpArtifactStore;
use nicflash_core::{FirmwareEngine, NodeReconcilerArgs};
use nicflash_exec::{DryRunRunner, LocalRunner, ProcessRunner};
use nicflash_inventory::{DiagnosticInventory, InventoryProvider};
use nicflash_kube::KubeClient;
use nicflash_maintenance::{CancelSignal, Coordinator};
use tracing::{info, warn};

use crate::config::Config;

/// Runtime options not taken from the config file
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub node_name: String,
    pub namespace: String,
    /// Log tool invocations instead of running them
    pub dry_run_tools: bool,
    /// Fired when the daemon is asked to stop
    pub shutdown: CancelSignal,
}

/// Inventory collector running the diagnostic tools for real
pub fn inventory(config: &Config, runner: Arc<dyn ProcessRunner>) -> Arc<dyn InventoryProvider> {
    Arc::new(
        DiagnosticInventory::new(runner)
            .with_tools(config.diagnostic_tools())
            .with_sysfs_root(&config.paths.sysfs_root),
    )
}

/// Update engine; with `dry_run_tools` only package extraction really runs
///
/// Tool dry runs also take the dry-run path of the engine, since the update
/// tool never writes its result file.
///
/// # Errors
/// Returns an error if the download client cannot be built.
pub fn engine(
    config: &Config,
    runner: Arc<dyn ProcessRunner>,
    inventory: Arc<dyn InventoryProvider>,
    dry_run_tools: bool,
) -> Result<FirmwareEngine> {
    let tools: Arc<dyn ProcessRunner> = if dry_run_tools {
        warn!("tool dry run enabled - firmware will not be touched");
        Arc::new(DryRunRunner::new(runner.clone()))
    } else {
        runner.clone()
    };

    let artifacts = HttpArtifactStore::new(config.download_timeout())
        .wrap_err("failed to build download client")?;

    Ok(FirmwareEngine::new(tools, inventory, Arc::new(artifacts))
        .with_staging_runner(runner)
        .with_layout(config.layout())
        .with_tools(config.update_tools())
        .with_forced_dry_run(dry_run_tools))
}

/// Everything the reconciler actor needs
///
/// # Errors
/// Returns an error if the engine cannot be built.
pub fn reconciler_args(
    config: &Config,
    client: &KubeClient,
    options: &NodeOptions,
) -> Result<NodeReconcilerArgs> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(LocalRunner::new());
    let inventory = inventory(config, runner.clone());
    let engine = engine(config, runner, inventory.clone(), options.dry_run_tools)?;

    let client = Arc::new(client.clone());
    let election = config.election(&options.namespace, &options.node_name);
    info!(
        lease = %election.lease_name,
        duration = ?election.lease_duration,
        "maintenance lease configured"
    );
    let coordinator = Coordinator::new(client.clone(), client.clone(), election, &options.node_name)
        .with_shutdown(options.shutdown.clone());

    Ok(NodeReconcilerArgs {
        node_name: options.node_name.clone(),
        namespace: options.namespace.clone(),
        engine: Arc::new(engine),
        coordinator: Arc::new(coordinator),
        inventory,
        status: client,
    })
}
