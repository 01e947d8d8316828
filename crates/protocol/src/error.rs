//! Error types reported by protocol engines and chain backends.

use paychan_types::{Amount, ChainAddress, ChannelId, TypesError, WireAddress};
use thiserror::Error;

/// Errors that can occur while negotiating with a peer or talking to the chain.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The peer declined a channel proposal.
    #[error("proposal rejected: {0}")]
    ProposalRejected(String),

    /// The peer declined a channel update.
    #[error("update rejected: {0}")]
    UpdateRejected(String),

    /// No peer is reachable at the given wire address.
    #[error("peer {0} is unreachable")]
    PeerUnreachable(WireAddress),

    /// The peer is reachable but has not installed request handlers.
    #[error("peer {0} is not handling requests")]
    PeerNotHandling(WireAddress),

    /// Another engine already listens on this wire address.
    #[error("wire address {0} already in use")]
    AddressInUse(WireAddress),

    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// An account cannot cover its channel deposit.
    #[error("insufficient on-chain funds for {account}: available {available}, required {required}")]
    InsufficientFunds {
        account: ChainAddress,
        available: Amount,
        required: Amount,
    },

    #[error("channel {0} is final")]
    ChannelFinal(ChannelId),

    #[error("channel {0} is not final")]
    NotFinal(ChannelId),

    #[error("channel {0} is closed")]
    ChannelClosed(ChannelId),

    /// On-chain adjudication refused the request.
    #[error("adjudication failed for channel {channel_id}: {reason}")]
    Adjudication { channel_id: ChannelId, reason: String },

    /// A proposal responder was used twice.
    #[error("proposal already answered")]
    AlreadyResponded,

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("engine is closed")]
    EngineClosed,

    #[error("watcher stopped: {0}")]
    WatcherStopped(String),

    /// Chain query failure.
    #[error("chain error: {0}")]
    Chain(String),

    #[error(transparent)]
    Types(#[from] TypesError),
}

/// Result type for engine and chain operations.
pub type EngineResult<T> = Result<T, EngineError>;
