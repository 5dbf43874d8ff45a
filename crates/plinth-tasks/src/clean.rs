//! Removal of the destination root.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Instant;

use crate::task::{Task, TaskError, TaskName, TaskReport};

/// Deletes the whole build output so a full build starts from nothing.
#[derive(Debug, Clone)]
pub struct CleanTask {
    dest_root: PathBuf,
}

impl CleanTask {
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
        }
    }
}

impl Task for CleanTask {
    fn name(&self) -> TaskName {
        TaskName::Clean
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();

        match fs::remove_dir_all(&self.dest_root) {
            Ok(()) => {
                tracing::debug!(path = %self.dest_root.display(), "Removed output directory");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.dest_root.display(), "Output directory already absent");
            }
            Err(e) => return Err(TaskError::io(&self.dest_root, e)),
        }

        let mut report = TaskReport::new(TaskName::Clean);
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_output_tree() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        fs::create_dir_all(dist.join("assets/images")).unwrap();
        fs::write(dist.join("assets/main.css"), "a{}").unwrap();

        CleanTask::new(&dist).run().unwrap();

        assert!(!dist.exists());
    }

    #[test]
    fn is_idempotent() {
        let temp = tempdir().unwrap();
        let dist = temp.path().join("dist");
        fs::create_dir_all(&dist).unwrap();

        let task = CleanTask::new(&dist);
        task.run().unwrap();
        task.run().unwrap();

        assert!(!dist.exists());
    }
}
