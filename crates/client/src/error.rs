//! Error types surfaced by the payment client.

use paychan_protocol::EngineError;
use paychan_types::{ChannelId, TypesError};
use thiserror::Error;

/// Errors returned by [`PaymentClient`](crate::PaymentClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Payment or settlement requested while no channel is installed.
    #[error("no active channel")]
    NoActiveChannel,

    /// Only one channel per client is supported.
    #[error("channel {0} is already open")]
    ChannelAlreadyOpen(ChannelId),

    /// The peer declined our channel proposal.
    #[error("channel proposal rejected: {0}")]
    ProposalRejected(String),

    /// The proposal could not be built or was refused by the engine as malformed.
    #[error("invalid channel proposal: {0}")]
    InvalidProposal(String),

    /// The payment amount cannot be applied to the current allocation.
    #[error("invalid payment: {0}")]
    InvalidPayment(#[source] TypesError),

    /// Negotiation with the peer failed; the channel keeps its prior state.
    #[error("negotiation failed: {0}")]
    Negotiation(#[source] EngineError),

    /// Settlement did not complete; the channel stays installed.
    #[error("settlement failed: {0}")]
    Settlement(#[source] EngineError),

    /// The client could not be built.
    #[error("client construction failed: {0}")]
    Construction(String),

    /// The client has been shut down.
    #[error("client is shut down")]
    ShutDown,
}

impl ClientError {
    /// True for the error returned when an operation needs a channel and none is open.
    pub fn is_no_active_channel(&self) -> bool {
        matches!(self, ClientError::NoActiveChannel)
    }

    /// Classify an engine failure that happened while proposing a channel.
    pub(crate) fn from_proposal(err: EngineError) -> Self {
        match err {
            EngineError::ProposalRejected(reason) => ClientError::ProposalRejected(reason),
            EngineError::InvalidProposal(reason) => ClientError::InvalidProposal(reason),
            EngineError::Types(e) => ClientError::InvalidProposal(e.to_string()),
            other => ClientError::Negotiation(other),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
