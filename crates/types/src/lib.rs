//! Shared domain types for the payment-channel client.
//!
//! Everything here is a plain value: amounts and assets, on-chain and
//! off-chain addresses, client identity, and the channel data model
//! (allocations, states, proposals, updates, adjudicator events).

pub mod address;
pub mod amount;
pub mod channel;
pub mod error;

pub use address::{Account, ChainAddress, ClientIdentity, Network, WireAddress};
pub use amount::{Amount, Asset};
pub use channel::{
    AdjudicatorEvent, Allocation, ChannelId, ChannelParams, ChannelProposal, ChannelState,
    ChannelUpdate, PartIdx, Participant, ProposalAcceptance, PROPOSER_IDX, RESPONDER_IDX,
};
pub use error::{Result, TypesError};
