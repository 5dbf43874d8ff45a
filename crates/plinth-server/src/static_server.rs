//! In-process application server for sites without a server command.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::server::ServerError;
use crate::supervisor::Readiness;

/// Serves the built site directly from disk.
pub struct StaticServer {
    root: PathBuf,
    addr: SocketAddr,
}

impl StaticServer {
    pub fn new(root: impl Into<PathBuf>, addr: SocketAddr) -> Self {
        Self {
            root: root.into(),
            addr,
        }
    }

    pub fn router(&self) -> Router {
        Router::new().fallback_service(ServeDir::new(&self.root))
    }

    /// Bind, report ready and serve until the surrounding task is dropped.
    pub async fn run(self, mut readiness: Readiness) -> Result<(), ServerError> {
        readiness.starting();
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ServerError::Bind(self.addr, e.to_string()))?;

        tracing::info!(
            addr = %self.addr,
            root = %self.root.display(),
            "Serving site statically"
        );
        readiness.ready();

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Serve(e.to_string()))
    }
}
