//! The serve stage: application server plus reload bridge.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::task::JoinHandle;

use crate::proxy::ReloadProxy;
use crate::reload::ReloadHub;
use crate::static_server::StaticServer;
use crate::supervisor::{readiness, Supervisor, SupervisorConfig, RESTART_DELAY};

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Application server command; empty serves `site_dir` statically
    pub command: Vec<String>,

    /// Globs, relative to `root`, that restart the application server
    pub watch: Vec<String>,

    /// Project root the command runs in
    pub root: PathBuf,

    /// Built site, used by the static fallback
    pub site_dir: PathBuf,

    /// Host to bind to
    pub host: String,

    /// Application server port
    pub port: u16,

    /// Reload proxy port
    pub proxy_port: u16,

    /// Open browser on start
    pub open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string(), "server.js".to_string()],
            watch: vec!["server.js".to_string(), "server/**/*.js".to_string()],
            root: PathBuf::from("."),
            site_dir: PathBuf::from("dist"),
            host: "127.0.0.1".to_string(),
            port: 8005,
            proxy_port: 8006,
            open: true,
        }
    }
}

impl ServerConfig {
    pub fn app_addr(&self) -> Result<SocketAddr, ServerError> {
        self.addr(self.port)
    }

    pub fn proxy_addr(&self) -> Result<SocketAddr, ServerError> {
        self.addr(self.proxy_port)
    }

    fn addr(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let raw = format!("{}:{}", self.host, port);
        raw.parse().map_err(|_| ServerError::Address(raw))
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to bind to {0}: {1}")]
    Bind(SocketAddr, String),

    #[error("Server error: {0}")]
    Serve(String),

    #[error("No server command configured")]
    EmptyCommand,

    #[error("Failed to start `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Application server stopped before it was ready")]
    NeverReady,

    #[error("Invalid watch pattern {0}")]
    Pattern(String),

    #[error("File watch error: {0}")]
    Watch(String),
}

/// Start the application server, then the reload proxy once it first
/// becomes ready. Runs until the surrounding task is dropped.
pub async fn serve(config: ServerConfig, hub: ReloadHub) -> Result<(), ServerError> {
    let app_addr = config.app_addr()?;
    let proxy_addr = config.proxy_addr()?;
    let (readiness, first_ready) = readiness();

    let mut app: JoinHandle<Result<(), ServerError>> = if config.command.is_empty() {
        tokio::spawn(StaticServer::new(&config.site_dir, app_addr).run(readiness))
    } else {
        let supervisor = Supervisor::new(
            SupervisorConfig {
                command: config.command.clone(),
                watch: config.watch.clone(),
                root: config.root.clone(),
                addr: app_addr,
                restart_delay: RESTART_DELAY,
            },
            readiness,
        );
        tokio::spawn(supervisor.run())
    };

    tokio::select! {
        ready = first_ready.wait() => ready?,
        joined = &mut app => return flatten(joined),
    }

    let proxy = ReloadProxy::new(app_addr, proxy_addr, hub).with_open(config.open);
    tokio::select! {
        result = proxy.run() => result,
        joined = &mut app => flatten(joined),
    }
}

fn flatten(joined: Result<Result<(), ServerError>, tokio::task::JoinError>) -> Result<(), ServerError> {
    joined.map_err(|e| ServerError::Serve(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_site_layout() {
        let config = ServerConfig::default();

        assert_eq!(config.app_addr().unwrap().port(), 8005);
        assert_eq!(config.proxy_addr().unwrap().port(), 8006);
        assert_eq!(config.command, vec!["node", "server.js"]);
    }

    #[test]
    fn rejects_unparseable_host() {
        let config = ServerConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            config.app_addr().unwrap_err(),
            ServerError::Address(_)
        ));
    }

    #[tokio::test]
    async fn static_fallback_reports_bind_failure() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = ServerConfig {
            command: Vec::new(),
            port,
            open: false,
            ..Default::default()
        };

        let err = serve(config, ReloadHub::new()).await.unwrap_err();

        assert!(matches!(err, ServerError::Bind(_, _) | ServerError::NeverReady));
    }
}
