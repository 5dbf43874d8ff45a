//! Glob-based input discovery.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::task::TaskError;

/// A matched input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Full path on disk
    pub path: PathBuf,

    /// Path relative to the directory that was scanned
    pub relative: PathBuf,
}

/// Compile a glob where `*` never crosses a `/`.
pub(crate) fn matcher(pattern: &str) -> Result<GlobMatcher, TaskError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| TaskError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Collect every file under `dir` whose relative path matches `pattern`.
///
/// Results are sorted by relative path so task output does not depend on
/// directory iteration order. A missing `dir` is an error; an empty one is not.
pub fn collect(dir: &Path, pattern: &str) -> Result<Vec<SourceFile>, TaskError> {
    collect_excluding(dir, pattern, None)
}

/// Like [`collect`], skipping everything below `exclude`.
pub fn collect_excluding(
    dir: &Path,
    pattern: &str,
    exclude: Option<&Path>,
) -> Result<Vec<SourceFile>, TaskError> {
    if !dir.is_dir() {
        return Err(TaskError::MissingSource(dir.display().to_string()));
    }

    let glob = matcher(pattern)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |ex| e.path() != ex));

    for entry in walker {
        let entry = entry.map_err(|e| TaskError::Io {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();

        if glob.is_match(slash_path(&relative)) {
            files.push(SourceFile {
                path: path.to_path_buf(),
                relative,
            });
        }
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Render a relative path with `/` separators.
pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TaskError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| TaskError::io(path, e))
}

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &Path) -> Result<(), TaskError> {
    fs::create_dir_all(dir).map_err(|e| TaskError::io(dir, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn flat_glob_ignores_subdirectories() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.js"), "a").unwrap();
        fs::create_dir_all(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested/b.js"), "b").unwrap();

        let files = collect(temp.path(), "*.js").unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("a.js"));
    }

    #[test]
    fn recursive_glob_is_sorted() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("z")).unwrap();
        fs::write(temp.path().join("z/b.png"), "b").unwrap();
        fs::write(temp.path().join("a.png"), "a").unwrap();

        let files = collect(temp.path(), "**/*.*").unwrap();
        let names: Vec<String> = files.iter().map(|f| slash_path(&f.relative)).collect();

        assert_eq!(names, vec!["a.png", "z/b.png"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempdir().unwrap();
        let err = collect(&temp.path().join("nope"), "*.*").unwrap_err();

        assert!(matches!(err, TaskError::MissingSource(_)));
    }

    #[test]
    fn excludes_subtree() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("templates")).unwrap();
        fs::write(temp.path().join("templates/base.html"), "").unwrap();
        fs::write(temp.path().join("index.html"), "").unwrap();

        let exclude = temp.path().join("templates");
        let files = collect_excluding(temp.path(), "**/*.html", Some(&exclude)).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, PathBuf::from("index.html"));
    }
}
