//! The task abstraction shared by every build step.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Names of the build tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskName {
    Clean,
    Favicon,
    Library,
    Video,
    Images,
    Styles,
    Fonts,
    Scripts,
    Html,
}

impl TaskName {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskName::Clean => "clean",
            TaskName::Favicon => "favicon",
            TaskName::Library => "library",
            TaskName::Video => "video",
            TaskName::Images => "images",
            TaskName::Styles => "styles",
            TaskName::Fonts => "fonts",
            TaskName::Scripts => "scripts",
            TaskName::Html => "html",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clean" => Ok(TaskName::Clean),
            "favicon" => Ok(TaskName::Favicon),
            "library" | "lib" => Ok(TaskName::Library),
            "video" => Ok(TaskName::Video),
            "images" => Ok(TaskName::Images),
            "styles" | "scss" => Ok(TaskName::Styles),
            "fonts" => Ok(TaskName::Fonts),
            "scripts" | "script" => Ok(TaskName::Scripts),
            "html" => Ok(TaskName::Html),
            other => Err(TaskError::UnknownTask(other.to_string())),
        }
    }
}

/// What connected browsers should do after a task rewrites its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Output is not watched by browsers
    None,
    /// Reload the whole page
    Full,
    /// Swap stylesheets in place
    Css,
}

/// Summary of a finished task run.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Task that produced this report
    pub task: TaskName,

    /// Files written to the destination
    pub outputs: Vec<PathBuf>,

    /// Inputs that failed but did not abort the task
    pub failed: usize,

    /// Wall time in milliseconds
    pub duration_ms: u64,
}

impl TaskReport {
    pub fn new(task: TaskName) -> Self {
        Self {
            task,
            outputs: Vec::new(),
            failed: 0,
            duration_ms: 0,
        }
    }
}

/// Errors that can occur while running a task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Source directory not found: {0}")]
    MissingSource(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Failed to compile {path}: {message}")]
    Compile { path: String, message: String },

    #[error("Failed to resolve '{specifier}' from {path}")]
    Resolve { path: String, specifier: String },

    #[error("Failed to render {count} page(s)")]
    Render { count: usize },

    #[error("Deploy failed: {0}")]
    Deploy(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

impl TaskError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        TaskError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// A named, idempotent unit of work over a file set.
pub trait Task: Send + Sync {
    /// Task identifier
    fn name(&self) -> TaskName;

    /// How browsers react to this task's output.
    fn reload(&self) -> ReloadKind {
        ReloadKind::None
    }

    /// Run the task to completion.
    fn run(&self) -> Result<TaskReport, TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_aliases() {
        assert_eq!("scss".parse::<TaskName>().unwrap(), TaskName::Styles);
        assert_eq!("script".parse::<TaskName>().unwrap(), TaskName::Scripts);
        assert_eq!("html".parse::<TaskName>().unwrap(), TaskName::Html);
        assert!("deploy".parse::<TaskName>().is_err());
    }

    #[test]
    fn displays_canonical_name() {
        assert_eq!(TaskName::Library.to_string(), "library");
        assert_eq!(
            TaskName::Library.as_str().parse::<TaskName>().unwrap(),
            TaskName::Library
        );
    }
}
