//! russh adapter
//!
//! Implements the engine's connection and channel traits on top of
//! `russh`. The russh [`Handler`](russh::server::Handler) callbacks only
//! forward: channel offers, channel requests, and channel input are sent
//! to the engine over queues. Offers and requests are answered from the
//! callback that received them; data, exit-status, and close go out
//! through [`russh::server::Handle`].
//!
//! Limitations of the adapter:
//!
//! - russh refuses channel types it does not know itself, so only
//!   `session`, `x11`, and `direct-tcpip` offers reach the engine.
//! - A refusal carries no reason code or message of ours.
//! - russh does not expose `want_reply`. Every channel request reaches the
//!   engine as wanting a reply; russh only puts the answer on the wire
//!   when the peer asked for one.

mod channel;
mod handler;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::MethodSet;
use russh_keys::key::KeyPair;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use gm_core::ErrorSink;

use crate::auth::PasswordVerifier;
use crate::error::SshdError;
use crate::server::{EstablishedConnection, Handshaker};

pub use channel::{RusshChannel, RusshOffer};
pub use handler::BridgeHandler;

/// Channel offers queued per connection
const OFFER_QUEUE: usize = 16;

/// Global requests queued per connection
const GLOBAL_REQUEST_QUEUE: usize = 16;

/// russh server configuration for password-only login with `host_key`
pub fn server_config(host_key: KeyPair) -> russh::server::Config {
    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.methods = MethodSet::PASSWORD;
    config.auth_rejection_time = Duration::from_secs(1);
    config.auth_rejection_time_initial = Some(Duration::from_secs(0));
    config
}

/// [`Handshaker`] backed by russh
pub struct RusshHandshaker {
    config: Arc<russh::server::Config>,
    verifier: Arc<dyn PasswordVerifier>,
    error_sink: Arc<dyn ErrorSink>,
}

impl RusshHandshaker {
    /// Create a handshaker
    ///
    /// Connections that fail before authenticating are reported to
    /// `error_sink`.
    pub fn new(
        host_key: KeyPair,
        verifier: Arc<dyn PasswordVerifier>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            config: Arc::new(server_config(host_key)),
            verifier,
            error_sink,
        }
    }
}

#[async_trait]
impl Handshaker for RusshHandshaker {
    async fn handshake(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<EstablishedConnection, SshdError> {
        let (offers_tx, offers_rx) = mpsc::channel(OFFER_QUEUE);
        let (global_tx, global_rx) = mpsc::channel(GLOBAL_REQUEST_QUEUE);
        let authenticated = Arc::new(AtomicBool::new(false));

        let handler = BridgeHandler::new(
            peer,
            Arc::clone(&self.verifier),
            Arc::clone(&authenticated),
            offers_tx,
            global_tx,
        );

        let session = russh::server::run_stream(Arc::clone(&self.config), stream, handler)
            .await
            .map_err(|e| SshdError::Handshake(e.into()))?;

        let error_sink = Arc::clone(&self.error_sink);
        tokio::spawn(async move {
            match session.await {
                Ok(()) => {
                    tracing::info!("Connection from {} closed normally", peer);
                }
                Err(e) if !authenticated.load(Ordering::SeqCst) => {
                    tracing::debug!("Connection from {} failed before login: {}", peer, e);
                    error_sink.report(&SshdError::Handshake(e.into()));
                }
                Err(e) => {
                    tracing::warn!("Connection from {} closed with error: {}", peer, e);
                }
            }
        });

        Ok(EstablishedConnection {
            channels: offers_rx,
            global_requests: global_rx,
        })
    }
}
