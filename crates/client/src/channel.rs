//! The client's view of its one open channel.

use std::sync::Arc;

use paychan_protocol::ChannelHandle;
use paychan_types::{Amount, Asset, ChannelId, ChannelParams, ChannelState, PartIdx};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::metrics;

/// Wraps an engine channel handle together with the asset its balances are in.
pub struct PaymentChannel {
    handle: Arc<dyn ChannelHandle>,
    asset: Asset,
}

impl PaymentChannel {
    pub fn new(handle: Arc<dyn ChannelHandle>, asset: Asset) -> Self {
        Self { handle, asset }
    }

    pub fn id(&self) -> ChannelId {
        self.handle.id()
    }

    pub fn idx(&self) -> PartIdx {
        self.handle.idx()
    }

    pub fn params(&self) -> &ChannelParams {
        self.handle.params()
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub(crate) fn handle(&self) -> &Arc<dyn ChannelHandle> {
        &self.handle
    }

    /// Current state as reported by the engine.
    pub async fn state(&self) -> ChannelState {
        self.handle.state().await
    }

    /// Move `amount` from us to the peer. Blocks until the peer answers.
    pub async fn send_payment(&self, amount: Amount) -> Result<()> {
        let idx = self.idx();
        let mut allocation = self.state().await.allocation;
        allocation
            .transfer(idx, 1 - idx, amount)
            .map_err(ClientError::InvalidPayment)?;

        match self.handle.update(allocation, false).await {
            Ok(()) => {
                metrics::record_payment_result(true);
                info!(
                    "Sent {} {} on channel {}",
                    self.asset.format_amount(amount, usize::from(self.asset.decimals)),
                    self.asset,
                    self.id()
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_payment_result(false);
                warn!("Payment on channel {} failed: {}", self.id(), e);
                Err(ClientError::Negotiation(e))
            }
        }
    }

    /// Finalize (if needed), conclude on chain, withdraw and release the handle.
    pub async fn settle(&self) -> Result<()> {
        let result = self.settle_inner().await;
        metrics::record_settlement_result(result.is_ok());
        result
    }

    async fn settle_inner(&self) -> Result<()> {
        let state = self.state().await;
        if !state.is_final {
            debug!("Finalizing channel {} at version {}", self.id(), state.version);
            self.handle
                .update(state.allocation, true)
                .await
                .map_err(ClientError::Settlement)?;
        }

        self.handle.settle().await.map_err(ClientError::Settlement)?;
        self.handle.close().await.map_err(ClientError::Settlement)?;
        info!("Channel {} settled", self.id());
        Ok(())
    }
}
