//! Project configuration (plinth.toml).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use plinth_server::ServerConfig;
use plinth_tasks::{BuildConfig, DeployConfig};

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
    #[serde(default)]
    pub deploy: DeploySection,
}

#[derive(Debug, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_src")]
    pub src: PathBuf,
    #[serde(default = "default_dist")]
    pub dist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            dist: default_dist(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Empty serves the built site statically
    #[serde(default = "default_command")]
    pub command: Vec<String>,
    #[serde(default = "default_server_watch")]
    pub watch: Vec<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,
    #[serde(default = "default_true")]
    pub open: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            watch: default_server_watch(),
            host: default_host(),
            port: default_port(),
            proxy_port: default_proxy_port(),
            open: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScriptsConfig {
    #[serde(default = "default_target")]
    pub target: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TemplatesConfig {
    /// Variables available in every page
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct DeploySection {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_message")]
    pub message: String,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
            cache_dir: default_cache_dir(),
            message: default_message(),
        }
    }
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}
fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}
fn default_command() -> Vec<String> {
    vec!["node".to_string(), "server.js".to_string()]
}
fn default_server_watch() -> Vec<String> {
    vec!["server.js".to_string(), "server/**/*.js".to_string()]
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8005
}
fn default_proxy_port() -> u16 {
    8006
}
fn default_true() -> bool {
    true
}
fn default_target() -> String {
    plinth_tasks::scripts::DEFAULT_TARGET.to_string()
}
fn default_jpeg_quality() -> u8 {
    plinth_tasks::images::DEFAULT_JPEG_QUALITY
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "gh-pages".to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".publish")
}
fn default_message() -> String {
    "Update".to_string()
}

impl Config {
    /// Load configuration from `path` if it exists.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No {} found; using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if !(1..=100).contains(&config.images.jpeg_quality) {
            anyhow::bail!(
                "images.jpeg_quality must be between 1 and 100, got {}",
                config.images.jpeg_quality
            );
        }
        Ok(config)
    }

    pub fn build_config(&self) -> BuildConfig {
        BuildConfig {
            src_dir: self.paths.src.clone(),
            output_dir: self.paths.dist.clone(),
            script_target: self.scripts.target.clone(),
            jpeg_quality: self.images.jpeg_quality,
            template_data: self.templates.data.clone(),
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            command: self.server.command.clone(),
            watch: self.server.watch.clone(),
            root: PathBuf::from("."),
            site_dir: self.paths.dist.clone(),
            host: self.server.host.clone(),
            port: self.server.port,
            proxy_port: self.server.proxy_port,
            open: self.server.open,
        }
    }

    pub fn deploy_config(&self) -> DeployConfig {
        DeployConfig {
            source_dir: self.paths.dist.clone(),
            project_root: PathBuf::from("."),
            remote: self.deploy.remote.clone(),
            branch: self.deploy.branch.clone(),
            cache_dir: self.deploy.cache_dir.clone(),
            message: self.deploy.message.clone(),
        }
    }
}
