//! Per-connection supervision
//!
//! Drives one accepted TCP connection: SSH handshake, then channel
//! dispatch and global-request handling until the client goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use gm_core::ShellConfig;

use crate::channel::{GlobalRequest, NewChannel};
use crate::error::SshdError;
use crate::server::dispatcher::{ChannelDispatcher, ChannelProcessor};
use crate::session::SessionHandler;

/// A connection that completed the SSH handshake
pub struct EstablishedConnection {
    /// Channel offers, ending when the connection closes
    pub channels: mpsc::Receiver<Box<dyn NewChannel>>,
    /// Connection-wide requests, ending when the connection closes
    pub global_requests: mpsc::Receiver<GlobalRequest>,
}

/// Performs the SSH handshake on an accepted socket
#[async_trait]
pub trait Handshaker: Send + Sync {
    /// Run key exchange and authentication
    async fn handshake(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<EstablishedConnection, SshdError>;
}

/// Consumes the global requests of a connection
#[async_trait]
pub trait RequestDiscarder: Send + Sync {
    /// Answer every request until the stream ends
    async fn discard(&self, requests: mpsc::Receiver<GlobalRequest>);
}

/// Refuses every global request
#[derive(Debug, Default, Clone, Copy)]
pub struct RefuseGlobalRequests;

#[async_trait]
impl RequestDiscarder for RefuseGlobalRequests {
    async fn discard(&self, mut requests: mpsc::Receiver<GlobalRequest>) {
        while let Some(request) = requests.recv().await {
            tracing::debug!("Refusing global request {}", request.kind);
            request.reply(false);
        }
    }
}

/// Supervises accepted connections
pub struct ConnectionSupervisor {
    handshaker: Arc<dyn Handshaker>,
    discarder: Arc<dyn RequestDiscarder>,
    dispatcher: ChannelDispatcher,
    shell: ShellConfig,
}

impl ConnectionSupervisor {
    /// Supervisor that binds session channels to shells
    pub fn new(handshaker: Arc<dyn Handshaker>, shell: ShellConfig) -> Self {
        let processor = Arc::new(SessionHandler::new(shell.clone()));
        Self::with_parts(handshaker, Arc::new(RefuseGlobalRequests), processor, shell)
    }

    /// Supervisor with custom request and channel handling
    pub fn with_parts(
        handshaker: Arc<dyn Handshaker>,
        discarder: Arc<dyn RequestDiscarder>,
        processor: Arc<dyn ChannelProcessor>,
        shell: ShellConfig,
    ) -> Self {
        Self {
            handshaker,
            discarder,
            dispatcher: ChannelDispatcher::new(processor, shell.clone()),
            shell,
        }
    }

    /// Serve one connection until its channel offers end
    pub async fn supervise(&self, stream: TcpStream, peer: SocketAddr) {
        tracing::info!("New connection from {}", peer);

        let connection = match self.handshaker.handshake(stream, peer).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::debug!("Handshake with {} failed: {}", peer, e);
                self.shell.report(&e);
                return;
            }
        };

        let discarder = Arc::clone(&self.discarder);
        let global_requests = connection.global_requests;
        tokio::spawn(async move {
            discarder.discard(global_requests).await;
        });

        self.dispatcher.run(connection.channels).await;
        tracing::info!("Connection from {} closed", peer);
    }
}
