//! Channel protocol collaborator contracts.
//!
//! This crate describes, as traits, everything the payment client consumes
//! but does not implement: the channel protocol engine and its channel
//! handles, the chain query client, the funder and the adjudicator.
//!
//! The [`local`] module provides a complete in-process backend (wire bus,
//! two-party engine, ledger) used by the demo binary and by tests.

pub mod chain;
pub mod engine;
pub mod error;
pub mod local;

pub use chain::{Adjudicator, ChainClient, Funder, FundingRequest};
#[cfg(any(test, feature = "mocks"))]
pub use chain::MockChainClient;
pub use engine::{
    AdjudicatorEventHandler, ChannelHandle, ProposalHandler, ProposalResponder, ProtocolEngine,
    StateUpdateListener, UpdateDecision, UpdateHandler,
};
pub use error::{EngineError, EngineResult};
pub use local::{LocalBus, LocalEngine, LocalLedger};
