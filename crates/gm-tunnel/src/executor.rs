//! Forwarding agent supervision
//!
//! The agent only prints its full status screen when attached to a
//! terminal, so it runs under a pseudo-terminal and its output is read on a
//! blocking task, like any other PTY in gmash.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gm_core::config::TunnelConfig;

use crate::error::{FailureReason, TunnelError};
use crate::scan::{OutputScanner, PublicAddress};

/// Size of each read from the agent's terminal
const READ_CHUNK: usize = 1024;

/// Result of one tunnel attempt
pub type TunnelOutcome = Result<Tunnel, TunnelError>;

type OutputChunk = io::Result<Vec<u8>>;

/// Starts the forwarding agent and waits for its public address
#[derive(Debug, Clone)]
pub struct TunnelExecutor {
    agent: String,
    window_cols: u16,
    window_rows: u16,
    startup_deadline: Option<Duration>,
}

impl TunnelExecutor {
    /// Executor for `agent` with a 100x100 terminal and no deadline
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            window_cols: 100,
            window_rows: 100,
            startup_deadline: None,
        }
    }

    /// Executor built from the `[tunnel]` config section
    pub fn from_config(config: &TunnelConfig) -> Self {
        Self::new(config.agent.clone())
            .with_window_size(config.window_cols, config.window_rows)
            .with_deadline(config.startup_deadline())
    }

    /// Terminal size handed to the agent
    pub fn with_window_size(mut self, cols: u16, rows: u16) -> Self {
        self.window_cols = cols;
        self.window_rows = rows;
        self
    }

    /// Give up with [`FailureReason::Canceled`] after `deadline`
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.startup_deadline = deadline;
        self
    }

    /// Start `<agent> tcp <port>` and wait until it reports a public
    /// address, fails, or `cancel` fires.
    ///
    /// Every failure path kills the agent it started. On success the agent
    /// keeps running for as long as the returned [`Tunnel`] lives.
    pub async fn execute(&self, cancel: &CancellationToken, port: u16) -> TunnelOutcome {
        if cancel.is_cancelled() {
            return Err(TunnelError::new(
                FailureReason::Canceled,
                "canceled before the agent was started",
            ));
        }

        let program = self.resolve_agent()?;
        tracing::info!("Starting forwarding agent {:?} for port {}", program, port);

        let (mut agent, mut output) = self.spawn(&program, port)?;

        match self.watch(cancel, &mut output).await {
            Ok(address) => {
                tracing::info!("Forwarding agent published {}", address);
                Ok(Tunnel::new(address, agent, output))
            }
            Err(e) => {
                tracing::warn!("Forwarding agent failed: {}", e);
                agent.kill();
                Err(e)
            }
        }
    }

    fn resolve_agent(&self) -> Result<PathBuf, TunnelError> {
        match which::which(&self.agent) {
            Ok(path) => Ok(path),
            Err(e) => {
                let path = Path::new(&self.agent);
                if path.components().count() > 1 && path.exists() {
                    Err(TunnelError::new(
                        FailureReason::UnexecutableNgrok,
                        format!("{} exists but cannot be executed", path.display()),
                    ))
                } else {
                    Err(TunnelError::new(
                        FailureReason::MissingNgrok,
                        format!("{} not found ({})", self.agent, e),
                    ))
                }
            }
        }
    }

    fn spawn(
        &self,
        program: &Path,
        port: u16,
    ) -> Result<(AgentProcess, mpsc::Receiver<OutputChunk>), TunnelError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.window_rows,
                cols: self.window_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TunnelError::new(FailureReason::Canceled, e))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.arg("tcp");
        cmd.arg(port.to_string());

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            let reason = classify_spawn_error(program, &e);
            TunnelError::new(reason, e)
        })?;
        // Only the child keeps the slave open, so reads fail once it exits.
        drop(pair.slave);

        let mut agent = AgentProcess {
            child,
            master: pair.master,
        };
        tracing::debug!("Forwarding agent running with pid {:?}", agent.child.process_id());

        if let Err(e) = self.size_window(agent.master.as_ref()) {
            agent.kill();
            return Err(e);
        }

        let reader = match agent.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(e) => {
                agent.kill();
                return Err(TunnelError::new(FailureReason::CantReadFromPty, e));
            }
        };

        let (tx, rx) = mpsc::channel(64);
        spawn_output_reader(reader, tx);

        Ok((agent, rx))
    }

    #[cfg(unix)]
    fn size_window(&self, master: &dyn MasterPty) -> Result<(), TunnelError> {
        let fd = master.as_raw_fd().ok_or_else(|| {
            TunnelError::new(
                FailureReason::CantSetPtyWindowSize,
                "pty has no file descriptor",
            )
        })?;

        crate::winsize::set_window_size(fd, self.window_cols, self.window_rows)
            .map_err(|e| TunnelError::new(FailureReason::CantSetPtyWindowSize, e))
    }

    #[cfg(not(unix))]
    fn size_window(&self, master: &dyn MasterPty) -> Result<(), TunnelError> {
        master
            .resize(PtySize {
                rows: self.window_rows,
                cols: self.window_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| TunnelError::new(FailureReason::CantSetPtyWindowSize, e))
    }

    async fn watch(
        &self,
        cancel: &CancellationToken,
        output: &mut mpsc::Receiver<OutputChunk>,
    ) -> Result<PublicAddress, TunnelError> {
        let mut scanner = OutputScanner::new();

        let deadline = async {
            match self.startup_deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            let chunk = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log_unfinished_output(&scanner);
                    return Err(TunnelError::new(
                        FailureReason::Canceled,
                        "canceled while waiting for the agent",
                    ));
                }

                _ = &mut deadline => {
                    log_unfinished_output(&scanner);
                    return Err(TunnelError::new(
                        FailureReason::Canceled,
                        "deadline exceeded while waiting for the agent",
                    ));
                }

                chunk = output.recv() => chunk,
            };

            match chunk {
                Some(Ok(data)) => {
                    tracing::trace!("Read {} bytes from forwarding agent", data.len());
                    if let Some(result) = scanner.push(&data) {
                        return result;
                    }
                }
                Some(Err(e)) => {
                    return Err(TunnelError::new(FailureReason::CantReadFromPty, e));
                }
                None => {
                    return Err(TunnelError::new(
                        FailureReason::CantReadFromPty,
                        "agent output ended before a forwarding address appeared",
                    ));
                }
            }
        }
    }
}

fn log_unfinished_output(scanner: &OutputScanner) {
    tracing::debug!(
        "Forwarding agent output so far: {:?}",
        String::from_utf8_lossy(scanner.output())
    );
}

/// Why an agent that `which` resolved still failed to start.
///
/// The program can change between lookup and exec. An exec refused for
/// permissions or format means the agent is unexecutable; a program that
/// vanished is missing. portable-pty checks the path itself before exec
/// and reports that as plain text, so those failures are re-checked on disk.
fn classify_spawn_error(program: &Path, error: &anyhow::Error) -> FailureReason {
    match error.chain().find_map(|cause| cause.downcast_ref::<io::Error>()) {
        Some(e) => classify_exec_error(e),
        None if !program.exists() => FailureReason::MissingNgrok,
        None if which::which(program).is_err() => FailureReason::UnexecutableNgrok,
        None => FailureReason::Canceled,
    }
}

fn classify_exec_error(error: &io::Error) -> FailureReason {
    match error.kind() {
        io::ErrorKind::NotFound => FailureReason::MissingNgrok,
        io::ErrorKind::PermissionDenied => FailureReason::UnexecutableNgrok,
        #[cfg(unix)]
        _ if error.raw_os_error() == Some(libc::ENOEXEC) => FailureReason::UnexecutableNgrok,
        _ => FailureReason::Canceled,
    }
}

/// Read the agent's terminal on a blocking task until EOF or error
fn spawn_output_reader(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<OutputChunk>) {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("Forwarding agent output EOF");
                    break;
                }
                Ok(n) => {
                    if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // EIO here just means the agent exited.
                    tracing::debug!("Forwarding agent output closed: {}", e);
                    let _ = tx.blocking_send(Err(e));
                    break;
                }
            }
        }
    });
}

struct AgentProcess {
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
}

impl AgentProcess {
    fn kill(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill() {
            tracing::debug!("Failed to kill forwarding agent: {}", e);
            return;
        }
        let _ = self.child.wait();
    }
}

/// A live tunnel.
///
/// Owns the agent process: dropping the tunnel (or calling
/// [`Tunnel::shutdown`]) kills the agent and closes the public address.
pub struct Tunnel {
    address: PublicAddress,
    agent: AgentProcess,
    drain: JoinHandle<()>,
}

impl Tunnel {
    fn new(address: PublicAddress, agent: AgentProcess, mut output: mpsc::Receiver<OutputChunk>) -> Self {
        // Keep reading so the agent never blocks on a full terminal.
        let drain = tokio::spawn(async move { while output.recv().await.is_some() {} });

        Self {
            address,
            agent,
            drain,
        }
    }

    /// The public address
    pub fn address(&self) -> &PublicAddress {
        &self.address
    }

    /// Public host name
    pub fn host(&self) -> &str {
        &self.address.host
    }

    /// Public port
    pub fn port(&self) -> u16 {
        self.address.port
    }

    /// Process id of the agent
    pub fn pid(&self) -> Option<u32> {
        self.agent.child.process_id()
    }

    /// Whether the agent is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.agent.child.try_wait(), Ok(None))
    }

    /// Stop the agent
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        tracing::debug!("Stopping forwarding agent for {}", self.address);
        self.drain.abort();
        self.agent.kill();
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("address", &self.address)
            .field("pid", &self.agent.child.process_id())
            .finish()
    }
}
