//! Development server, live reload and watch loop for plinth sites.
//!
//! The application server is either a supervised child process or an
//! in-process static server. A reverse proxy in front of it injects a live
//! reload script, and the watch coordinator re-runs build tasks as sources
//! change.

pub mod proxy;
pub mod reload;
pub mod server;
pub mod static_server;
pub mod supervisor;
pub mod watcher;

pub use proxy::ReloadProxy;
pub use reload::{ReloadHub, ReloadMessage};
pub use server::{serve, ServerConfig, ServerError};
pub use static_server::StaticServer;
pub use supervisor::{readiness, FirstReady, Readiness, ServerState, Supervisor, SupervisorConfig};
pub use watcher::WatchCoordinator;
