//! Single task command.

use anyhow::{Context, Result};
use plinth_tasks::{default_graph, Builder, TaskName};

use crate::config::Config;

/// Run one named task against the configured layout.
pub async fn run(config: &Config, name: &str) -> Result<()> {
    let name: TaskName = name.parse()?;
    let builder = Builder::new(default_graph(&config.build_config())?);

    let report = builder
        .run(name)
        .await
        .with_context(|| format!("Task {} failed", name))?;

    if report.failed > 0 {
        tracing::warn!(task = %name, "{} files were skipped", report.failed);
    }
    Ok(())
}
