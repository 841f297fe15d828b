//! Channel dispatch
//!
//! Routes each channel offer on a connection: `session` channels are
//! accepted and handed to a [`ChannelProcessor`] on their own task,
//! everything else is refused.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use gm_core::ShellConfig;
use gm_protocol::request;

use crate::channel::{AcceptedChannel, NewChannel, RejectReason};
use crate::error::SshdError;

/// Serves an accepted `session` channel
#[async_trait]
pub trait ChannelProcessor: Send + Sync {
    /// Run the channel to completion
    async fn process(&self, channel: AcceptedChannel);
}

/// Accepts or refuses the channel offers of one connection
pub struct ChannelDispatcher {
    processor: Arc<dyn ChannelProcessor>,
    shell: ShellConfig,
}

impl ChannelDispatcher {
    /// Create a dispatcher
    pub fn new(processor: Arc<dyn ChannelProcessor>, shell: ShellConfig) -> Self {
        Self { processor, shell }
    }

    /// Handle offers until the connection stops producing them
    pub async fn run(&self, mut offers: mpsc::Receiver<Box<dyn NewChannel>>) {
        while let Some(offer) = offers.recv().await {
            self.dispatch(offer).await;
        }
        tracing::debug!("Channel offers closed");
    }

    async fn dispatch(&self, offer: Box<dyn NewChannel>) {
        let channel_type = offer.channel_type().to_string();

        if channel_type != request::CHANNEL_SESSION {
            tracing::debug!("Refusing {} channel", channel_type);
            self.shell
                .report(&SshdError::UnsupportedChannelType(channel_type));

            if let Err(e) = offer
                .reject(RejectReason::UnknownChannelType, "unknown channel type")
                .await
            {
                self.shell.report(&e);
            }
            return;
        }

        match offer.accept().await {
            Ok(channel) => {
                tracing::debug!("Accepted session channel");
                let processor = Arc::clone(&self.processor);
                tokio::spawn(async move {
                    processor.process(channel).await;
                });
            }
            Err(e) => {
                self.shell.report(&SshdError::ChannelAccept(Box::new(e)));
            }
        }
    }
}
