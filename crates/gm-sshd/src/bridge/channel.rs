//! russh-backed channel handles and offers

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::{mpsc, oneshot};

use crate::channel::{AcceptedChannel, ChannelHandle, ChannelRequest, NewChannel, RejectReason};
use crate::error::SshdError;

/// Outbound side of a russh channel
pub struct RusshChannel {
    id: ChannelId,
    handle: Handle,
}

impl RusshChannel {
    pub fn new(id: ChannelId, handle: Handle) -> Self {
        Self { id, handle }
    }
}

#[async_trait]
impl ChannelHandle for RusshChannel {
    async fn data(&self, data: &[u8]) -> Result<(), SshdError> {
        self.handle
            .data(self.id, CryptoVec::from_slice(data))
            .await
            .map_err(|_| SshdError::ChannelClosed)
    }

    async fn exit_status(&self, status: u32) -> Result<(), SshdError> {
        self.handle
            .exit_status_request(self.id, status)
            .await
            .map_err(|_| SshdError::ChannelClosed)
    }

    async fn close(&self) -> Result<(), SshdError> {
        self.handle
            .close(self.id)
            .await
            .map_err(|_| SshdError::ChannelClosed)
    }
}

/// A channel open request waiting for the engine's decision
pub struct RusshOffer {
    channel_type: &'static str,
    id: ChannelId,
    handle: Handle,
    decision: oneshot::Sender<bool>,
    requests: mpsc::Receiver<ChannelRequest>,
    input: mpsc::Receiver<Bytes>,
}

impl RusshOffer {
    pub(crate) fn new(
        channel_type: &'static str,
        id: ChannelId,
        handle: Handle,
        decision: oneshot::Sender<bool>,
        requests: mpsc::Receiver<ChannelRequest>,
        input: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            channel_type,
            id,
            handle,
            decision,
            requests,
            input,
        }
    }
}

#[async_trait]
impl NewChannel for RusshOffer {
    fn channel_type(&self) -> &str {
        self.channel_type
    }

    async fn accept(self: Box<Self>) -> Result<AcceptedChannel, SshdError> {
        let this = *self;
        this.decision
            .send(true)
            .map_err(|_| SshdError::ChannelClosed)?;

        Ok(AcceptedChannel {
            handle: Arc::new(RusshChannel::new(this.id, this.handle)),
            requests: this.requests,
            input: this.input,
        })
    }

    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<(), SshdError> {
        tracing::debug!(
            "Refusing {} channel {:?} ({:?}: {})",
            self.channel_type,
            self.id,
            reason,
            message
        );
        self.decision
            .send(false)
            .map_err(|_| SshdError::ChannelClosed)
    }
}
