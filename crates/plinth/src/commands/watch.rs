//! Watch command.

use std::sync::Arc;

use anyhow::Result;
use plinth_server::{ReloadHub, WatchCoordinator};
use plinth_tasks::default_graph;

use crate::config::Config;

/// Re-run tasks as sources change, without serving.
pub async fn run(config: &Config) -> Result<()> {
    let build = config.build_config();
    let graph = Arc::new(default_graph(&build)?);
    let watcher = WatchCoordinator::new(Arc::new(build.path_table()), graph, ReloadHub::new());

    tokio::select! {
        watched = watcher.run() => watched?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
