//! Engine-side view of SSH channels and requests
//!
//! These traits are the seam between the session engine and the SSH
//! protocol library. The engine never touches `russh` types; tests drive
//! it with in-memory fakes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::SshdError;

/// Callback that answers a channel request
type ReplyFn = Box<dyn FnOnce(bool) + Send>;

/// One channel request (`pty-req`, `shell`, `env`, ...)
///
/// A request that wants a reply carries its own answer path, so replies
/// cannot get attached to the wrong request when the peer pipelines them.
pub struct ChannelRequest {
    /// Request type name
    pub kind: String,
    /// Whether the peer waits for a success/failure reply
    pub want_reply: bool,
    /// Type-specific payload in wire layout
    pub payload: Bytes,
    reply: Option<ReplyFn>,
}

impl ChannelRequest {
    /// Create a request whose reply goes nowhere
    pub fn new(kind: impl Into<String>, want_reply: bool, payload: Bytes) -> Self {
        Self {
            kind: kind.into(),
            want_reply,
            payload,
            reply: None,
        }
    }

    /// Create a request that wants a reply and the receiver it will arrive on
    pub fn with_reply(
        kind: impl Into<String>,
        payload: Bytes,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let request = Self::new(kind, true, payload).on_reply(move |success| {
            let _ = tx.send(success);
        });
        (request, rx)
    }

    /// Route the reply to `reply`
    pub fn on_reply(mut self, reply: impl FnOnce(bool) + Send + 'static) -> Self {
        self.reply = Some(Box::new(reply));
        self
    }

    /// Answer the request if the peer asked for an answer.
    ///
    /// Dropping a request unanswered counts as a refusal.
    pub fn reply(mut self, success: bool) {
        if !self.want_reply {
            return;
        }
        if let Some(reply) = self.reply.take() {
            reply(success);
        }
    }
}

impl fmt::Debug for ChannelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRequest")
            .field("kind", &self.kind)
            .field("want_reply", &self.want_reply)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Outbound half of an accepted channel
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Send data to the peer
    async fn data(&self, data: &[u8]) -> Result<(), SshdError>;

    /// Send an `exit-status` request
    async fn exit_status(&self, status: u32) -> Result<(), SshdError>;

    /// Close the channel
    async fn close(&self) -> Result<(), SshdError>;
}

/// An accepted channel: its outbound handle plus its two inbound streams.
///
/// `requests` ends when the peer closes the channel; `input` ends at EOF
/// or close, whichever comes first.
pub struct AcceptedChannel {
    pub handle: Arc<dyn ChannelHandle>,
    pub requests: mpsc::Receiver<ChannelRequest>,
    pub input: mpsc::Receiver<Bytes>,
}

impl fmt::Debug for AcceptedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptedChannel").finish_non_exhaustive()
    }
}

/// Reason codes for refusing a channel (RFC 4254 §5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AdministrativelyProhibited = 1,
    ConnectFailed = 2,
    UnknownChannelType = 3,
    ResourceShortage = 4,
}

/// A channel the peer wants to open, awaiting a decision
#[async_trait]
pub trait NewChannel: Send {
    /// Channel type name (`session`, `x11`, `direct-tcpip`, ...)
    fn channel_type(&self) -> &str;

    /// Accept the channel
    async fn accept(self: Box<Self>) -> Result<AcceptedChannel, SshdError>;

    /// Refuse the channel
    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<(), SshdError>;
}

/// A connection-wide request (e.g. `tcpip-forward`)
#[derive(Debug)]
pub struct GlobalRequest {
    /// Request type name
    pub kind: String,
    /// Whether the peer waits for a reply
    pub want_reply: bool,
    reply: Option<oneshot::Sender<bool>>,
}

impl GlobalRequest {
    /// Create a request and the receiver its reply will arrive on
    pub fn new(kind: impl Into<String>, want_reply: bool) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            kind: kind.into(),
            want_reply,
            reply: Some(tx),
        };
        (request, rx)
    }

    /// Answer the request. Dropping it unanswered counts as a refusal.
    pub fn reply(mut self, success: bool) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(success);
        }
    }
}
