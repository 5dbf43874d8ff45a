//! Verbatim asset copying (fonts, libraries, video, favicons).

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::fileset;
use crate::paths::{Category, PathTable};
use crate::task::{ReloadKind, Task, TaskError, TaskName, TaskReport};

/// Copies every matching file of one category, byte for byte.
#[derive(Debug, Clone)]
pub struct CopyTask {
    name: TaskName,
    category: Category,
    reload: ReloadKind,
    paths: Arc<PathTable>,
}

impl CopyTask {
    pub fn new(name: TaskName, category: Category, paths: Arc<PathTable>) -> Self {
        Self {
            name,
            category,
            reload: ReloadKind::None,
            paths,
        }
    }

    pub fn fonts(paths: Arc<PathTable>) -> Self {
        Self::new(TaskName::Fonts, Category::Fonts, paths)
    }

    pub fn library(paths: Arc<PathTable>) -> Self {
        Self::new(TaskName::Library, Category::Lib, paths)
    }

    pub fn video(paths: Arc<PathTable>) -> Self {
        Self::new(TaskName::Video, Category::Video, paths)
    }

    pub fn favicon(paths: Arc<PathTable>) -> Self {
        Self::new(TaskName::Favicon, Category::Favicon, paths).with_reload(ReloadKind::Full)
    }

    pub fn with_reload(mut self, reload: ReloadKind) -> Self {
        self.reload = reload;
        self
    }
}

impl Task for CopyTask {
    fn name(&self) -> TaskName {
        self.name
    }

    fn reload(&self) -> ReloadKind {
        self.reload
    }

    fn run(&self) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let mapping = self.paths.get(self.category);

        let files = fileset::collect(&mapping.source, self.category.input_glob())?;
        fileset::ensure_dir(&mapping.dest)?;

        let outputs = files
            .par_iter()
            .map(|file| {
                let target = mapping.dest.join(&file.relative);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
                }
                fs::copy(&file.path, &target).map_err(|e| TaskError::io(&file.path, e))?;
                Ok(target)
            })
            .collect::<Result<Vec<_>, TaskError>>()?;

        tracing::info!(
            task = %self.name,
            files = outputs.len(),
            "Copied {} to {}",
            mapping.source.display(),
            mapping.dest.display()
        );

        let mut report = TaskReport::new(self.name);
        report.outputs = outputs;
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn table(root: &Path) -> Arc<PathTable> {
        Arc::new(PathTable::new(root.join("src"), root.join("dist")))
    }

    #[test]
    fn copies_nested_video_byte_for_byte() {
        let temp = tempdir().unwrap();
        let paths = table(temp.path());
        let src = paths.source(Category::Video).to_path_buf();
        fs::create_dir_all(src.join("clips")).unwrap();
        let bytes: Vec<u8> = (0..=255).collect();
        fs::write(src.join("clips/intro.mp4"), &bytes).unwrap();
        fs::write(src.join("poster.jpg"), b"poster").unwrap();

        let report = CopyTask::video(paths.clone()).run().unwrap();

        let dest = paths.dest(Category::Video);
        assert_eq!(report.outputs.len(), 2);
        assert_eq!(fs::read(dest.join("clips/intro.mp4")).unwrap(), bytes);
        assert_eq!(fs::read(dest.join("poster.jpg")).unwrap(), b"poster");
    }

    #[test]
    fn library_copy_is_flat_and_js_only() {
        let temp = tempdir().unwrap();
        let paths = table(temp.path());
        let src = paths.source(Category::Lib).to_path_buf();
        fs::create_dir_all(src.join("vendor")).unwrap();
        fs::write(src.join("jquery.js"), "jq").unwrap();
        fs::write(src.join("README.md"), "docs").unwrap();
        fs::write(src.join("vendor/deep.js"), "deep").unwrap();

        CopyTask::library(paths.clone()).run().unwrap();

        let dest = paths.dest(Category::Lib);
        assert!(dest.join("jquery.js").exists());
        assert!(!dest.join("README.md").exists());
        assert!(!dest.join("vendor/deep.js").exists());
    }

    #[test]
    fn missing_source_fails_only_this_task() {
        let temp = tempdir().unwrap();
        let paths = table(temp.path());

        let err = CopyTask::fonts(paths).run().unwrap_err();

        assert!(matches!(err, TaskError::MissingSource(_)));
    }
}
