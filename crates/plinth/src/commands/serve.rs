//! Dev server command.

use anyhow::Result;
use plinth_server::ReloadHub;

use crate::config::Config;

/// Run the application server and reload proxy without watching sources.
pub async fn run(config: &Config, open: bool) -> Result<()> {
    let mut server = config.server_config();
    server.open = server.open && open;

    if server.command.is_empty() && !server.site_dir.exists() {
        anyhow::bail!(
            "Directory not found: {}. Run 'plinth build' first.",
            server.site_dir.display()
        );
    }

    tokio::select! {
        served = plinth_server::serve(server, ReloadHub::new()) => served?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
