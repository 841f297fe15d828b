//! russh connection handler
//!
//! One [`BridgeHandler`] per connection. It keeps the senders for every
//! accepted channel and forwards each callback to the engine.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use tokio::sync::{mpsc, oneshot};

use gm_protocol::pty::encode_terminal_modes;
use gm_protocol::{request, PtyConfig, WindowChange};

use crate::auth::PasswordVerifier;
use crate::bridge::channel::RusshOffer;
use crate::channel::{ChannelRequest, GlobalRequest, NewChannel};

/// Requests queued per channel
const REQUEST_QUEUE: usize = 16;

/// Input chunks queued per channel
const INPUT_QUEUE: usize = 64;

/// Senders feeding one accepted channel
struct ChannelSenders {
    requests: mpsc::Sender<ChannelRequest>,
    /// `None` after EOF
    input: Option<mpsc::Sender<Bytes>>,
}

/// Handler for a single SSH client connection
pub struct BridgeHandler {
    /// Peer address of the connecting client
    peer_addr: SocketAddr,
    verifier: Arc<dyn PasswordVerifier>,
    authenticated: Arc<AtomicBool>,
    offers: mpsc::Sender<Box<dyn NewChannel>>,
    global_requests: mpsc::Sender<GlobalRequest>,
    /// Accepted channels
    channels: HashMap<ChannelId, ChannelSenders>,
}

impl BridgeHandler {
    /// Create a handler for the connection from `peer_addr`
    pub fn new(
        peer_addr: SocketAddr,
        verifier: Arc<dyn PasswordVerifier>,
        authenticated: Arc<AtomicBool>,
        offers: mpsc::Sender<Box<dyn NewChannel>>,
        global_requests: mpsc::Sender<GlobalRequest>,
    ) -> Self {
        Self {
            peer_addr,
            verifier,
            authenticated,
            offers,
            global_requests,
            channels: HashMap::new(),
        }
    }

    /// Hand a channel offer to the engine and wait for its decision
    async fn offer(
        &mut self,
        channel_type: &'static str,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> bool {
        let id = channel.id();
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        let (decision_tx, decision_rx) = oneshot::channel();

        let offer = RusshOffer::new(
            channel_type,
            id,
            session.handle(),
            decision_tx,
            requests_rx,
            input_rx,
        );
        if self.offers.send(Box::new(offer)).await.is_err() {
            tracing::debug!("No dispatcher for {} channel {:?}", channel_type, id);
            return false;
        }

        let accepted = decision_rx.await.unwrap_or(false);
        if accepted {
            tracing::debug!("Channel opened: {:?}", id);
            self.channels.insert(
                id,
                ChannelSenders {
                    requests: requests_tx,
                    input: Some(input_tx),
                },
            );
        }
        accepted
    }

    /// Forward a channel request to the engine and answer it.
    ///
    /// russh keeps a single pending-reply flag per channel and overwrites
    /// it with every incoming request, so the answer has to be sent from
    /// the callback that received the request. It does not tell callbacks
    /// whether the peer wants a reply either: every request is forwarded as
    /// wanting one and `Session` drops the answer when the peer did not ask.
    async fn forward(
        &self,
        channel: ChannelId,
        kind: &str,
        payload: Bytes,
        session: &mut Session,
    ) {
        let (request, reply) = ChannelRequest::with_reply(kind, payload);
        let success = self.send_request(channel, request).await && reply.await.unwrap_or(false);

        if success {
            session.channel_success(channel);
        } else {
            session.channel_failure(channel);
        }
    }

    async fn send_request(&self, channel: ChannelId, request: ChannelRequest) -> bool {
        let Some(senders) = self.channels.get(&channel) else {
            tracing::debug!("{} request for unknown channel {:?}", request.kind, channel);
            return false;
        };
        if senders.requests.send(request).await.is_err() {
            tracing::debug!("Channel {:?} no longer takes requests", channel);
            return false;
        }
        true
    }

    /// Hand a global request to the engine and wait for the answer
    async fn global(&self, kind: &str) -> bool {
        let (request, reply) = GlobalRequest::new(kind, true);
        if self.global_requests.send(request).await.is_err() {
            return false;
        }
        reply.await.unwrap_or(false)
    }
}

#[async_trait]
impl Handler for BridgeHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        tracing::info!("Password auth attempt from {} ({})", self.peer_addr, user);

        if self.verifier.verify(user, password) {
            self.authenticated.store(true, Ordering::SeqCst);
            return Ok(Auth::Accept);
        }

        tracing::warn!("Authentication REJECTED for {} ({})", self.peer_addr, user);
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.offer("session", channel, session).await)
    }

    async fn channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.offer("x11", channel, session).await)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(self.offer("direct-tcpip", channel, session).await)
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = PtyConfig {
            term: Bytes::copy_from_slice(term.as_bytes()),
            width_chars: col_width,
            height_rows: row_height,
            width_pixels: pix_width,
            height_pixels: pix_height,
            terminal_modes: encode_terminal_modes(
                modes.iter().map(|(opcode, value)| (*opcode as u8, *value)),
            ),
        }
        .encode();

        self.forward(channel, request::PTY_REQ, payload, session).await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = WindowChange {
            width_chars: col_width,
            height_rows: row_height,
            width_pixels: pix_width,
            height_pixels: pix_height,
        }
        .encode();

        self.forward(channel, request::WINDOW_CHANGE, payload, session).await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(channel, request::SHELL, Bytes::new(), session).await;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = gm_protocol::PayloadWriter::new().put_bytes(data).finish();
        self.forward(channel, request::EXEC, payload, session).await;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = gm_protocol::PayloadWriter::new()
            .put_bytes(variable_name.as_bytes())
            .put_bytes(variable_value.as_bytes())
            .finish();
        self.forward(channel, request::ENV, payload, session).await;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = gm_protocol::PayloadWriter::new()
            .put_bytes(name.as_bytes())
            .finish();
        self.forward(channel, request::SUBSYSTEM, payload, session).await;
        Ok(())
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("tcpip-forward {}:{} from {}", address, port, self.peer_addr);
        Ok(self.global(request::TCPIP_FORWARD).await)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "cancel-tcpip-forward {}:{} from {}",
            address,
            port,
            self.peer_addr
        );
        Ok(self.global(request::CANCEL_TCPIP_FORWARD).await)
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("Received {} bytes on channel {:?}", data.len(), channel);

        let input = self
            .channels
            .get(&channel)
            .and_then(|senders| senders.input.clone());
        if let Some(input) = input {
            let _ = input.send(Bytes::copy_from_slice(data)).await;
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF: {:?}", channel);
        if let Some(senders) = self.channels.get_mut(&channel) {
            senders.input = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}
