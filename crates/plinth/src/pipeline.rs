//! The default pipeline: build everything, then serve and watch.

use std::sync::Arc;

use anyhow::Result;
use plinth_server::{ReloadHub, WatchCoordinator};
use plinth_tasks::{default_graph, Builder};

use crate::commands::build::log_summary;
use crate::config::Config;

/// Build, then run the dev server and the watch coordinator together until
/// interrupted.
pub async fn run(config: &Config) -> Result<()> {
    let build = config.build_config();
    let builder = Builder::new(default_graph(&build)?);

    tracing::info!("Building {}...", build.src_dir.display());
    let result = builder.build(build.output_dir.clone()).await?;
    log_summary(&result);

    let hub = ReloadHub::new();
    let watcher = WatchCoordinator::new(Arc::new(build.path_table()), builder.graph(), hub.clone());

    tokio::select! {
        served = plinth_server::serve(config.server_config(), hub) => served?,
        watched = watcher.run() => watched?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
