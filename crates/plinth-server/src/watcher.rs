//! Re-running build tasks when sources change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use plinth_tasks::{run_task, styles, Category, PathTable, ReloadKind, TaskGraph, TaskName};

use crate::reload::{ReloadHub, ReloadMessage};
use crate::server::ServerError;

/// Quiet period that ends a burst of events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watch `root` recursively, yielding every created, modified or removed path.
pub fn watch_tree(
    root: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<PathBuf>), ServerError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "File watch error"),
        }
    })
    .map_err(|e| ServerError::Watch(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| ServerError::Watch(format!("{}: {}", root.display(), e)))?;

    Ok((watcher, rx))
}

/// `path` relative to `root` with `/` separators.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Maps source changes to task re-runs and browser reloads.
pub struct WatchCoordinator {
    paths: Arc<PathTable>,
    graph: Arc<TaskGraph>,
    hub: ReloadHub,
    root: PathBuf,
    debounce: Duration,
}

impl WatchCoordinator {
    pub fn new(paths: Arc<PathTable>, graph: Arc<TaskGraph>, hub: ReloadHub) -> Self {
        let root = paths
            .src_root()
            .canonicalize()
            .unwrap_or_else(|_| paths.src_root().to_path_buf());
        Self {
            paths,
            graph,
            hub,
            root,
            debounce: DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The task a changed path triggers, if any.
    pub fn route(&self, path: &Path) -> Option<TaskName> {
        let relative = relative_slash_path(&self.root, path)?;
        let task = self.paths.categorize(&relative)?.task();
        self.graph.contains(task).then_some(task)
    }

    /// Watch the source root until the surrounding task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        let (_watcher, mut rx) = watch_tree(&self.root)?;
        tracing::info!(root = %self.root.display(), "Watching for changes");

        while let Some(path) = rx.recv().await {
            let mut pending = Vec::new();
            self.queue(&mut pending, &path);

            let quiet = tokio::time::sleep(self.debounce);
            tokio::pin!(quiet);
            loop {
                tokio::select! {
                    _ = &mut quiet => break,
                    next = rx.recv() => match next {
                        Some(path) => {
                            self.queue(&mut pending, &path);
                            quiet.as_mut().reset(tokio::time::Instant::now() + self.debounce);
                        }
                        None => break,
                    },
                }
            }

            self.run_batch(&pending).await;
        }

        Ok(())
    }

    fn queue(&self, pending: &mut Vec<TaskName>, path: &Path) {
        match self.route(path) {
            Some(task) if !pending.contains(&task) => {
                tracing::debug!(path = %path.display(), task = %task, "Change queued");
                pending.push(task);
            }
            Some(_) => {}
            None => tracing::debug!(path = %path.display(), "Change ignored"),
        }
    }

    /// Run `tasks` one at a time in graph order, notifying browsers after
    /// each success. Failures are logged and skipped.
    ///
    /// Returns the tasks that succeeded.
    pub async fn run_batch(&self, tasks: &[TaskName]) -> Vec<TaskName> {
        let mut succeeded = Vec::new();

        for name in self.graph.names() {
            if !tasks.contains(&name) {
                continue;
            }
            let Some(task) = self.graph.get(name) else {
                continue;
            };
            let reload = task.reload();

            match run_task(task).await {
                Ok(_) => {
                    self.notify(reload);
                    succeeded.push(name);
                }
                Err(e) => tracing::error!(task = %name, "{}", e),
            }
        }

        succeeded
    }

    fn notify(&self, reload: ReloadKind) {
        match reload {
            ReloadKind::None => {}
            ReloadKind::Full => self.hub.send(ReloadMessage::Reload),
            ReloadKind::Css => self.hub.send(ReloadMessage::Css {
                path: self.stylesheet_url(),
            }),
        }
    }

    fn stylesheet_url(&self) -> String {
        let dir = relative_slash_path(self.paths.dest_root(), self.paths.dest(Category::Style));
        match dir {
            Some(dir) => format!("/{}/{}", dir, styles::OUTPUT_FILE),
            None => format!("/{}", styles::OUTPUT_FILE),
        }
    }
}
