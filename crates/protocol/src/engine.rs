//! Channel protocol engine contracts.
//!
//! The client never implements the channel protocol itself. It drives an
//! engine through these traits and implements the handler traits so the
//! engine can call back into it:
//!
//! ```text
//!  PaymentClient ──propose/update/settle──> ProtocolEngine / ChannelHandle
//!        ▲                                          │
//!        └── ProposalHandler / UpdateHandler <──────┤ (engine dispatch tasks)
//!        └── StateUpdateListener <──────────────────┤ (every state transition)
//!        └── AdjudicatorEventHandler <──────────────┘ (watcher)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use paychan_types::{
    AdjudicatorEvent, Allocation, ChannelId, ChannelParams, ChannelProposal, ChannelState,
    ChannelUpdate, PartIdx, ProposalAcceptance, WireAddress,
};

use crate::error::EngineResult;

/// Receives every state transition of a channel, whether caused locally or
/// by the peer. Called synchronously by the engine, in transition order.
#[async_trait]
pub trait StateUpdateListener: Send + Sync {
    /// `from` is `None` for the initial state.
    async fn on_state_update(&self, from: Option<&ChannelState>, to: &ChannelState);
}

/// Receives on-chain events while a channel is being watched.
pub trait AdjudicatorEventHandler: Send + Sync {
    fn handle_adjudicator_event(&self, event: AdjudicatorEvent);
}

/// Handle to one open channel as seen by one participant.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn id(&self) -> ChannelId;

    /// Our participant index in this channel.
    fn idx(&self) -> PartIdx;

    fn params(&self) -> &ChannelParams;

    /// Current off-chain state snapshot.
    async fn state(&self) -> ChannelState;

    /// Negotiate a new allocation (and optionally finality) with the peer.
    /// Blocks until the peer accepts or rejects. A rejected update leaves the
    /// channel in its prior state.
    async fn update(&self, allocation: Allocation, is_final: bool) -> EngineResult<()>;

    /// Conclude a final channel on chain and withdraw our share.
    async fn settle(&self) -> EngineResult<()>;

    /// Release engine resources held for this channel.
    async fn close(&self) -> EngineResult<()>;

    /// Subscribe to every state transition of this channel.
    async fn on_update(&self, listener: Arc<dyn StateUpdateListener>);

    /// Watch the chain for disputes until the channel concludes.
    async fn watch(&self, handler: Arc<dyn AdjudicatorEventHandler>) -> EngineResult<()>;
}

/// One-shot answer to an inbound channel proposal.
#[async_trait]
pub trait ProposalResponder: Send + Sync {
    /// Accept the proposal, returning our handle to the new channel.
    async fn accept(&self, acceptance: ProposalAcceptance) -> EngineResult<Arc<dyn ChannelHandle>>;

    async fn reject(&self, reason: &str) -> EngineResult<()>;
}

/// Decides on inbound channel proposals.
#[async_trait]
pub trait ProposalHandler: Send + Sync {
    async fn handle_proposal(&self, proposal: ChannelProposal, responder: Box<dyn ProposalResponder>);
}

/// Verdict on an inbound channel update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    Accept,
    Reject(String),
}

/// Decides on inbound channel updates proposed by the peer.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle_update(&self, current: &ChannelState, update: &ChannelUpdate)
        -> UpdateDecision;
}

/// The external channel protocol engine.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    /// Our address on the wire transport.
    fn address(&self) -> &WireAddress;

    /// Send a proposal and wait for the peer's answer.
    async fn propose_channel(&self, proposal: ChannelProposal)
        -> EngineResult<Arc<dyn ChannelHandle>>;

    /// Install the handlers for inbound proposals and updates.
    async fn handle(&self, proposals: Arc<dyn ProposalHandler>, updates: Arc<dyn UpdateHandler>);

    /// Stop accepting requests and leave the transport.
    async fn close(&self) -> EngineResult<()>;
}
