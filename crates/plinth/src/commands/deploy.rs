//! Deploy command.

use anyhow::{Context, Result};
use plinth_tasks::{deploy, DeployOutcome};

use crate::config::Config;

/// Publish the built site.
pub async fn run(config: &Config) -> Result<()> {
    let deploy_config = config.deploy_config();
    tracing::info!(
        "Deploying {} to {}/{}",
        deploy_config.source_dir.display(),
        deploy_config.remote,
        deploy_config.branch
    );

    let outcome = deploy(&deploy_config)
        .await
        .context("Deploy failed")?;

    match outcome {
        DeployOutcome::Published { commit } => tracing::info!("Published {}", commit),
        DeployOutcome::Unchanged => tracing::info!("Already up to date"),
    }
    Ok(())
}
