//! Full site build command.

use anyhow::Result;
use plinth_tasks::{default_graph, BuildResult, Builder};

use crate::config::Config;

/// Run the build command.
pub async fn run(config: &Config) -> Result<()> {
    let build = config.build_config();
    tracing::info!("Building {}...", build.src_dir.display());

    let builder = Builder::new(default_graph(&build)?);
    let result = builder.build(build.output_dir.clone()).await?;
    log_summary(&result);

    Ok(())
}

pub fn log_summary(result: &BuildResult) {
    let failed: usize = result.reports.iter().map(|r| r.failed).sum();
    if failed > 0 {
        tracing::warn!("{} files could not be optimized and were skipped", failed);
    }

    tracing::info!(
        "Built {} files with {} tasks in {}ms",
        result.files(),
        result.reports.len(),
        result.duration_ms
    );
    tracing::info!("Output: {}", result.output_dir.display());
}
