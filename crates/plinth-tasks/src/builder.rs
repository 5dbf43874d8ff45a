//! Full-site builds over the task graph.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::clean::CleanTask;
use crate::copy::CopyTask;
use crate::graph::{GraphError, TaskGraph};
use crate::images::{ImageTask, DEFAULT_JPEG_QUALITY};
use crate::paths::PathTable;
use crate::scripts::{ScriptTask, DEFAULT_TARGET};
use crate::styles::StyleTask;
use crate::task::{Task, TaskError, TaskName, TaskReport};
use crate::templates::HtmlTask;

/// Configuration for building a site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Source root
    pub src_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Syntax target for scripts (e.g. "es2015")
    pub script_target: String,

    /// JPEG re-encode quality (1-100)
    pub jpeg_quality: u8,

    /// Variables exposed to every page template
    pub template_data: BTreeMap<String, serde_json::Value>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("src"),
            output_dir: PathBuf::from("dist"),
            script_target: DEFAULT_TARGET.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            template_data: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    pub fn path_table(&self) -> PathTable {
        PathTable::new(&self.src_dir, &self.output_dir)
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Report of every task, in run order
    pub reports: Vec<TaskReport>,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

impl BuildResult {
    /// Number of files written across all tasks.
    pub fn files(&self) -> usize {
        self.reports.iter().map(|r| r.outputs.len()).sum()
    }
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task {task} failed: {source}")]
    Task {
        task: TaskName,
        #[source]
        source: TaskError,
    },

    #[error("Task {task} panicked: {message}")]
    Panicked { task: TaskName, message: String },
}

/// Build the standard task graph.
///
/// `clean` runs first; every other task depends on it and on the task
/// before it, giving favicon, library, video, images, styles, fonts,
/// scripts, html.
pub fn default_graph(config: &BuildConfig) -> Result<TaskGraph, GraphError> {
    let paths = Arc::new(config.path_table());

    let chain: Vec<Arc<dyn Task>> = vec![
        Arc::new(CopyTask::favicon(paths.clone())),
        Arc::new(CopyTask::library(paths.clone())),
        Arc::new(CopyTask::video(paths.clone())),
        Arc::new(ImageTask::new(paths.clone(), config.jpeg_quality)),
        Arc::new(StyleTask::new(paths.clone())),
        Arc::new(CopyTask::fonts(paths.clone())),
        Arc::new(ScriptTask::new(paths.clone(), config.script_target.clone())),
        Arc::new(HtmlTask::new(paths.clone(), config.template_data.clone())),
    ];

    let mut graph = TaskGraph::new();
    graph.add(Arc::new(CleanTask::new(paths.dest_root())), &[])?;

    let mut previous = TaskName::Clean;
    for task in chain {
        let name = task.name();
        let after: Vec<TaskName> = if previous == TaskName::Clean {
            vec![TaskName::Clean]
        } else {
            vec![TaskName::Clean, previous]
        };
        graph.add(task, &after)?;
        previous = name;
    }

    graph.validate()?;
    Ok(graph)
}

/// Runs tasks from a graph.
pub struct Builder {
    graph: Arc<TaskGraph>,
}

impl Builder {
    pub fn new(graph: TaskGraph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    pub fn graph(&self) -> Arc<TaskGraph> {
        Arc::clone(&self.graph)
    }

    /// Run every task in derived order, stopping at the first failure.
    pub async fn build(&self, output_dir: PathBuf) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let order = self.graph.execution_order()?;

        let mut reports = Vec::with_capacity(order.len());
        for task in order {
            reports.push(run_task(task).await?);
        }

        Ok(BuildResult {
            reports,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir,
        })
    }

    /// Run a single task by name.
    pub async fn run(&self, name: TaskName) -> Result<TaskReport, BuildError> {
        let task = self.graph.get(name).ok_or(GraphError::Missing(name))?;
        run_task(task).await
    }
}

/// Run one task on the blocking pool.
pub async fn run_task(task: Arc<dyn Task>) -> Result<TaskReport, BuildError> {
    let name = task.name();
    tracing::debug!(task = %name, "Starting task");

    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || task.run())
        .await
        .map_err(|e| BuildError::Panicked {
            task: name,
            message: e.to_string(),
        })?;

    match result {
        Ok(mut report) => {
            report.duration_ms = start.elapsed().as_millis() as u64;
            tracing::info!(
                task = %name,
                files = report.outputs.len(),
                "Finished {} in {}ms",
                name,
                report.duration_ms
            );
            Ok(report)
        }
        Err(source) => Err(BuildError::Task { task: name, source }),
    }
}
