//! SSH server listener
//!
//! Accepts incoming connections and spawns a supervisor task for each.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gm_core::ShellConfig;

use crate::error::SshdError;
use crate::server::connection::{ConnectionSupervisor, Handshaker};

/// SSH server that listens for incoming connections
pub struct SshServer {
    supervisor: Arc<ConnectionSupervisor>,
    shell: ShellConfig,
}

impl SshServer {
    /// Server binding session channels to `shell`
    pub fn new(handshaker: Arc<dyn Handshaker>, shell: ShellConfig) -> Self {
        let supervisor = ConnectionSupervisor::new(handshaker, shell.clone());
        Self::with_supervisor(Arc::new(supervisor), shell)
    }

    /// Server with a custom connection supervisor
    pub fn with_supervisor(supervisor: Arc<ConnectionSupervisor>, shell: ShellConfig) -> Self {
        Self { supervisor, shell }
    }

    /// Bind `addr` and start accepting connections in the background.
    ///
    /// Returns once the listener is bound. Binding is the only failure
    /// reported here; everything after goes to the error sink.
    pub async fn listen(self, addr: &str) -> Result<ServerHandle, SshdError> {
        let bind_addr = normalize_bind_address(addr);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| SshdError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;

        let local_addr = listener.local_addr()?;
        tracing::info!("SSH server listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.accept_loop(listener, cancel.clone()));

        Ok(ServerHandle {
            local_addr,
            cancel,
            task,
        })
    }

    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("SSH server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            let supervisor = Arc::clone(&self.supervisor);
                            tokio::spawn(async move {
                                supervisor.supervise(socket, peer_addr).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                            self.shell.report(&SshdError::Accept(e));
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// A running server
///
/// Dropping the handle leaves the server running; call [`ServerHandle::close`]
/// to stop accepting. Connections already established are not affected.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port, useful when listening on port 0
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections and wait for the listener to close
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("SSH listener task failed: {}", e);
        }
    }
}

/// Fill in what a partial listen address leaves out.
///
/// An empty address or empty host means all interfaces, an empty port
/// means any free port: `""`, `":2222"`, and `"0.0.0.0:"` all bind.
pub fn normalize_bind_address(addr: &str) -> String {
    let addr = addr.trim();
    if addr.is_empty() {
        return "0.0.0.0:0".to_string();
    }

    let mut normalized = addr.to_string();
    if normalized.starts_with(':') {
        normalized.insert_str(0, "0.0.0.0");
    }
    if normalized.ends_with(':') {
        normalized.push('0');
    }
    normalized
}
