//! Single-slot handoff of accepted inbound channels.

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::channel::PaymentChannel;
use crate::error::{ClientError, Result};

/// Holds at most one accepted channel that nobody has adopted yet. A second
/// delivery waits until the first one is taken.
pub struct ChannelMailbox {
    tx: mpsc::Sender<PaymentChannel>,
    rx: Mutex<mpsc::Receiver<PaymentChannel>>,
}

impl ChannelMailbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Put a channel into the slot, waiting while it is occupied. Gives up
    /// with [`ClientError::ShutDown`] once `shutdown` fires.
    pub async fn deliver(
        &self,
        channel: PaymentChannel,
        shutdown: &CancellationToken,
    ) -> std::result::Result<(), (ClientError, PaymentChannel)> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err((ClientError::ShutDown, channel)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(channel);
                    Ok(())
                }
                Err(_) => Err((ClientError::ShutDown, channel)),
            },
        }
    }

    /// Take the next channel, waiting until one is delivered.
    pub async fn next(&self, shutdown: &CancellationToken) -> Result<PaymentChannel> {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(ClientError::ShutDown),
            channel = rx.recv() => channel.ok_or(ClientError::ShutDown),
        }
    }

    /// Whether a channel is waiting to be taken.
    pub fn is_occupied(&self) -> bool {
        self.tx.capacity() == 0
    }
}

impl Default for ChannelMailbox {
    fn default() -> Self {
        Self::new()
    }
}
