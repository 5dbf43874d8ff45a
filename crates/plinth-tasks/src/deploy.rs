//! Publishing the build output to a hosting branch.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::process::Command;
use walkdir::WalkDir;

use crate::task::TaskError;

/// Where and how to publish.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Directory whose contents are published
    pub source_dir: PathBuf,

    /// Repository the remote name is looked up in
    pub project_root: PathBuf,

    /// Remote name or URL
    pub remote: String,

    /// Branch receiving the output
    pub branch: String,

    /// Scratch clone reused between deploys
    pub cache_dir: PathBuf,

    /// Commit message prefix
    pub message: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("dist"),
            project_root: PathBuf::from("."),
            remote: "origin".to_string(),
            branch: "gh-pages".to_string(),
            cache_dir: PathBuf::from(".publish"),
            message: "Update".to_string(),
        }
    }
}

/// What a deploy did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// A new commit was pushed
    Published { commit: String },
    /// The branch already matched the output
    Unchanged,
}

/// Push the contents of `config.source_dir` to `config.branch`.
pub async fn deploy(config: &DeployConfig) -> Result<DeployOutcome, TaskError> {
    if !config.source_dir.is_dir() {
        return Err(TaskError::MissingSource(
            config.source_dir.display().to_string(),
        ));
    }

    let url = remote_url(config).await?;
    let cache = &config.cache_dir;
    fs::create_dir_all(cache).map_err(|e| TaskError::io(cache, e))?;

    if !cache.join(".git").exists() {
        git(cache, &["init", "--quiet"]).await?;
    }

    if git(cache, &["fetch", "--quiet", &url, &config.branch]).await.is_ok() {
        git(cache, &["checkout", "--quiet", "-f", "-B", &config.branch, "FETCH_HEAD"]).await?;
    } else {
        tracing::info!(branch = %config.branch, "Branch not on remote yet; starting it");
        let head = format!("refs/heads/{}", config.branch);
        git(cache, &["symbolic-ref", "HEAD", &head]).await?;
        git(cache, &["read-tree", "--empty"]).await?;
    }

    replace_tree(&config.source_dir, cache)?;
    git(cache, &["add", "--all"]).await?;

    let status = git(cache, &["status", "--porcelain"]).await?;
    if status.trim().is_empty() {
        tracing::info!(branch = %config.branch, "Nothing to deploy");
        return Ok(DeployOutcome::Unchanged);
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let message = format!("{} {}", config.message, stamp);

    let mut commit_args: Vec<&str> = Vec::new();
    if git(cache, &["config", "user.email"]).await.is_err() {
        commit_args.extend(["-c", "user.name=plinth", "-c", "user.email=plinth@localhost"]);
    }
    commit_args.extend(["commit", "--quiet", "-m", message.as_str()]);
    git(cache, &commit_args).await?;

    let refspec = format!("HEAD:refs/heads/{}", config.branch);
    git(cache, &["push", "--quiet", &url, &refspec]).await?;

    let commit = git(cache, &["rev-parse", "HEAD"]).await?.trim().to_string();
    tracing::info!(branch = %config.branch, commit = %commit, "Deployed {}", config.source_dir.display());

    Ok(DeployOutcome::Published { commit })
}

/// Resolve a remote name to its URL; URLs and paths pass through.
async fn remote_url(config: &DeployConfig) -> Result<String, TaskError> {
    if config.remote.contains(':') || config.remote.contains('/') {
        return Ok(config.remote.clone());
    }

    let url = git(&config.project_root, &["remote", "get-url", &config.remote]).await?;
    Ok(url.trim().to_string())
}

/// Replace everything but `.git` in `target` with a copy of `source`.
fn replace_tree(source: &Path, target: &Path) -> Result<(), TaskError> {
    for entry in fs::read_dir(target).map_err(|e| TaskError::io(target, e))? {
        let entry = entry.map_err(|e| TaskError::io(target, e))?;
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| TaskError::io(&path, e))?;
    }

    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| TaskError::Io {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let dest = target.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| TaskError::io(&dest, e))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| TaskError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Run git in `dir`, returning stdout.
async fn git(dir: &Path, args: &[&str]) -> Result<String, TaskError> {
    tracing::debug!(dir = %dir.display(), "git {}", args.join(" "));

    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(|e| TaskError::Deploy(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        return Err(TaskError::Deploy(format!(
            "git {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn missing_output_is_an_error() {
        let temp = tempdir().unwrap();
        let config = DeployConfig {
            source_dir: temp.path().join("dist"),
            ..Default::default()
        };

        let err = deploy(&config).await.unwrap_err();

        assert!(matches!(err, TaskError::MissingSource(_)));
    }

    #[tokio::test]
    async fn publishes_then_reports_unchanged() {
        if !git_available().await {
            return;
        }

        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote.git");
        fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "--quiet", "--bare"]).await.unwrap();

        let dist = temp.path().join("dist");
        fs::create_dir_all(dist.join("assets")).unwrap();
        fs::write(dist.join("index.html"), "<p>hi</p>").unwrap();
        fs::write(dist.join("assets/main.css"), "a{}").unwrap();

        let config = DeployConfig {
            source_dir: dist.clone(),
            project_root: temp.path().to_path_buf(),
            remote: remote.display().to_string(),
            cache_dir: temp.path().join(".publish"),
            ..Default::default()
        };

        let first = deploy(&config).await.unwrap();
        assert!(matches!(first, DeployOutcome::Published { .. }));

        let files = git(&remote, &["ls-tree", "-r", "--name-only", "gh-pages"])
            .await
            .unwrap();
        assert!(files.contains("index.html"));
        assert!(files.contains("assets/main.css"));

        let second = deploy(&config).await.unwrap();
        assert_eq!(second, DeployOutcome::Unchanged);
    }
}
