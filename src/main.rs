/*!
 * Desk Kernel - Main Entry Point
 *
 * Boots the supervisor against a local apps directory and JSON-file
 * stores, then runs until Ctrl-C.
 */

use desk_kernel::{init_tracing, FileStore, Kernel, KernelConfig, KernelError, LocalDirectory};
use miette::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = KernelConfig::from_env();
    init_tracing(config.trace_json);

    info!("Desk kernel starting...");
    info!(
        data_dir = %config.data_dir.display(),
        apps_dir = %config.apps_dir.display(),
        auto_register = config.auto_register_unknown,
        "Configuration loaded"
    );

    let resources = FileStore::open(&config.data_dir, KernelConfig::resource_store())
        .await
        .map_err(KernelError::from)?;
    let registry = FileStore::open(&config.data_dir, KernelConfig::registry_store())
        .await
        .map_err(KernelError::from)?;
    let directory = LocalDirectory::new(config.apps_dir.clone());

    let kernel = Kernel::builder(config)
        .with_directory(Arc::new(directory))
        .with_resource_store(Arc::new(resources))
        .with_registry_store(Arc::new(registry))
        .boot()
        .await?;

    let apps = kernel.list_apps().await?;
    info!(apps = apps.len(), "Kernel ready; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }

    info!("Saving application state...");
    kernel.force_save_all_states().await?;
    kernel.shutdown().await?;

    let stats = kernel.stats();
    info!(
        spawned = stats.contexts_spawned,
        terminated = stats.contexts_terminated,
        failed_flushes = stats.failed_flushes,
        "Kernel stopped"
    );
    Ok(())
}
