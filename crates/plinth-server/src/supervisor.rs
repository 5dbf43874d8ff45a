//! Supervision of the site's application server process.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::server::ServerError;
use crate::watcher::{relative_slash_path, watch_tree};

/// Pause between a process exit and the next spawn.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

const PORT_POLL: Duration = Duration::from_millis(100);

/// Lifecycle of the application server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Ready,
}

/// Resolves once, the first time the application server becomes ready.
#[derive(Debug)]
pub struct FirstReady {
    rx: oneshot::Receiver<()>,
}

impl FirstReady {
    /// Wait for the first ready transition.
    ///
    /// Fails if the server stopped before it ever became ready.
    pub async fn wait(self) -> Result<(), ServerError> {
        self.rx.await.map_err(|_| ServerError::NeverReady)
    }
}

/// Publishes [`ServerState`] and fires [`FirstReady`].
#[derive(Debug)]
pub struct Readiness {
    state: watch::Sender<ServerState>,
    first: Option<oneshot::Sender<()>>,
}

/// Create a readiness publisher and its one-shot first-ready future.
pub fn readiness() -> (Readiness, FirstReady) {
    let (state, _) = watch::channel(ServerState::NotStarted);
    let (tx, rx) = oneshot::channel();
    (
        Readiness {
            state,
            first: Some(tx),
        },
        FirstReady { rx },
    )
}

impl Readiness {
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn starting(&self) {
        self.state.send_replace(ServerState::Starting);
    }

    /// Mark the server ready. Returns true only for the first transition.
    pub fn ready(&mut self) -> bool {
        self.state.send_replace(ServerState::Ready);
        match self.first.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// How to run the application server.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program and arguments
    pub command: Vec<String>,

    /// Globs, relative to `root`, whose changes restart the process
    pub watch: Vec<String>,

    /// Working directory of the process and base of `watch`
    pub root: PathBuf,

    /// Address the process listens on
    pub addr: SocketAddr,

    /// Pause between an exit and the next spawn
    pub restart_delay: Duration,
}

enum Stopped {
    Exited(std::io::Result<ExitStatus>),
    Changed(PathBuf),
}

/// Keeps the application server running.
///
/// The process is restarted whenever it exits or a watched file changes,
/// without limit.
pub struct Supervisor {
    config: SupervisorConfig,
    readiness: Readiness,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, readiness: Readiness) -> Self {
        Self { config, readiness }
    }

    /// Run until the surrounding task is dropped.
    pub async fn run(mut self) -> Result<(), ServerError> {
        if self.config.command.is_empty() {
            return Err(ServerError::EmptyCommand);
        }

        let matcher = build_matcher(&self.config.watch)?;
        let (_watcher, mut changes) = if matcher.is_empty() {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        } else {
            let (watcher, rx) = watch_tree(&self.config.root)?;
            (Some(watcher), rx)
        };
        let root = self
            .config
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.config.root.clone());

        loop {
            self.readiness.starting();
            let mut child = self.spawn()?;
            let mut ready = false;

            let stopped = loop {
                tokio::select! {
                    status = child.wait() => break Stopped::Exited(status),
                    Some(path) = changes.recv() => {
                        if is_watched(&matcher, &root, &path) {
                            break Stopped::Changed(path);
                        }
                    }
                    _ = wait_for_port(self.config.addr), if !ready => {
                        ready = true;
                        if self.readiness.ready() {
                            tracing::info!(addr = %self.config.addr, "Application server ready");
                        } else {
                            tracing::info!(addr = %self.config.addr, "Application server back up");
                        }
                    }
                }
            };

            match stopped {
                Stopped::Exited(Ok(status)) => {
                    tracing::warn!(status = %status, "Application server exited; restarting");
                }
                Stopped::Exited(Err(e)) => {
                    tracing::error!(error = %e, "Lost track of application server; restarting");
                }
                Stopped::Changed(path) => {
                    tracing::info!(path = %path.display(), "Server source changed; restarting");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to stop application server");
                    }
                }
            }

            tokio::time::sleep(self.config.restart_delay).await;
            while changes.try_recv().is_ok() {}
        }
    }

    fn spawn(&self) -> Result<Child, ServerError> {
        let command = self.config.command.join(" ");
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or(ServerError::EmptyCommand)?;

        tracing::info!(cmd = %command, "Starting application server");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.config.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServerError::Spawn {
                command,
                message: e.to_string(),
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_lines(stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_lines(stderr, "stderr"));
        }

        Ok(child)
    }
}

async fn log_lines<R>(reader: R, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(stream, "{}", line);
    }
}

/// Poll until something accepts connections on `addr`.
pub async fn wait_for_port(addr: SocketAddr) {
    while TcpStream::connect(addr).await.is_err() {
        tokio::time::sleep(PORT_POLL).await;
    }
}

fn build_matcher(patterns: &[String]) -> Result<GlobSet, ServerError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| ServerError::Pattern(format!("{}: {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ServerError::Pattern(e.to_string()))
}

fn is_watched(matcher: &GlobSet, root: &Path, path: &Path) -> bool {
    relative_slash_path(root, path).is_some_and(|rel| matcher.is_match(rel))
}
