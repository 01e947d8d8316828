//! On-chain collaborator contracts: balance queries, funding and adjudication.

use async_trait::async_trait;
use paychan_types::{
    AdjudicatorEvent, Amount, ChainAddress, ChannelId, ChannelParams, ChannelState, PartIdx,
};
use tokio::sync::broadcast;

use crate::error::EngineResult;

/// Read access to account balances on chain.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Live balance of `account` in the smallest unit.
    async fn get_balance(&self, account: &ChainAddress) -> EngineResult<Amount>;
}

/// Deposit of one participant into a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub channel_id: ChannelId,
    pub idx: PartIdx,
    pub num_parts: usize,
    pub account: ChainAddress,
    pub amount: Amount,
}

/// Locks participant deposits on chain for a new channel.
#[async_trait]
pub trait Funder: Send + Sync {
    async fn fund(&self, request: &FundingRequest) -> EngineResult<()>;
}

/// Resolves channels on chain and reports what it did.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    /// Conclude a final state. Concluding an already concluded channel is a no-op.
    async fn conclude(&self, params: &ChannelParams, state: &ChannelState) -> EngineResult<()>;

    /// Pay out participant `idx`'s share of a concluded channel. Returns the
    /// amount paid, zero if it was already withdrawn.
    async fn withdraw(&self, params: &ChannelParams, idx: PartIdx) -> EngineResult<Amount>;

    /// Stream of adjudicator events for all channels.
    fn subscribe(&self) -> broadcast::Receiver<AdjudicatorEvent>;

    /// The conclusion event of a channel, if it has already concluded.
    async fn concluded_event(&self, channel_id: ChannelId) -> Option<AdjudicatorEvent>;
}
