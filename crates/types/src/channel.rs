//! Channel data model: allocations, states, proposals and updates.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::address::{ChainAddress, WireAddress};
use crate::amount::{Amount, Asset};
use crate::error::{Result, TypesError};

/// Index of a participant within a channel.
pub type PartIdx = usize;

/// The proposer always has index 0.
pub const PROPOSER_IDX: PartIdx = 0;

/// The responding peer of a two-party channel.
pub const RESPONDER_IDX: PartIdx = 1;

/// Unique channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    pub fn new_random() -> Self {
        ChannelId(Uuid::new_v4())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Balance distribution across channel participants for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub asset: Asset,
    pub balances: Vec<Amount>,
}

impl Allocation {
    pub fn new(asset: Asset, balances: Vec<Amount>) -> Self {
        Self { asset, balances }
    }

    /// Two-party allocation with the proposer's balance first.
    pub fn two_party(asset: Asset, proposer: Amount, peer: Amount) -> Self {
        Self::new(asset, vec![proposer, peer])
    }

    pub fn num_parts(&self) -> usize {
        self.balances.len()
    }

    pub fn balance(&self, idx: PartIdx) -> Result<Amount> {
        self.balances
            .get(idx)
            .copied()
            .ok_or(TypesError::ParticipantOutOfRange {
                idx,
                count: self.balances.len(),
            })
    }

    /// Sum of all balances.
    pub fn total(&self) -> Result<Amount> {
        self.balances
            .iter()
            .try_fold(Amount::ZERO, |acc, b| acc.checked_add(*b))
            .ok_or(TypesError::AmountOverflow)
    }

    /// Move `amount` from participant `from` to participant `to`.
    /// The allocation is left untouched on error.
    pub fn transfer(&mut self, from: PartIdx, to: PartIdx, amount: Amount) -> Result<()> {
        let count = self.balances.len();
        for idx in [from, to] {
            if idx >= count {
                return Err(TypesError::ParticipantOutOfRange { idx, count });
            }
        }
        if from == to {
            return Ok(());
        }

        let available = self.balances[from];
        let debited = available
            .checked_sub(amount)
            .ok_or(TypesError::InsufficientBalance {
                idx: from,
                available,
                requested: amount,
            })?;
        let credited = self.balances[to]
            .checked_add(amount)
            .ok_or(TypesError::AmountOverflow)?;

        self.balances[from] = debited;
        self.balances[to] = credited;
        Ok(())
    }
}

/// A participant's addresses inside a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub wire: WireAddress,
    pub chain: ChainAddress,
}

/// Fixed parameters of an open channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    pub id: ChannelId,
    pub participants: Vec<Participant>,
    /// On-chain challenge duration in seconds.
    pub challenge_duration_secs: u64,
}

/// Snapshot of a channel's off-chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub id: ChannelId,
    pub version: u64,
    pub allocation: Allocation,
    pub is_final: bool,
}

impl ChannelState {
    pub fn initial(id: ChannelId, allocation: Allocation) -> Self {
        Self {
            id,
            version: 0,
            allocation,
            is_final: false,
        }
    }

    pub fn balance(&self, idx: PartIdx) -> Result<Amount> {
        self.allocation.balance(idx)
    }
}

/// Offer to open a ledger channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProposal {
    /// On-chain challenge duration in seconds.
    pub challenge_duration_secs: u64,
    /// Proposer's on-chain account.
    pub proposer: ChainAddress,
    /// Wire addresses of all participants; the proposer comes first.
    pub participants: Vec<WireAddress>,
    pub init_alloc: Allocation,
}

impl ChannelProposal {
    /// Build and validate a ledger channel proposal.
    pub fn ledger(
        challenge_duration_secs: u64,
        proposer: ChainAddress,
        init_alloc: Allocation,
        participants: Vec<WireAddress>,
    ) -> Result<Self> {
        let proposal = Self {
            challenge_duration_secs,
            proposer,
            participants,
            init_alloc,
        };
        proposal.validate()?;
        Ok(proposal)
    }

    pub fn validate(&self) -> Result<()> {
        if self.challenge_duration_secs == 0 {
            return Err(TypesError::InvalidProposal(
                "challenge duration must be positive".to_string(),
            ));
        }
        if self.participants.len() < 2 {
            return Err(TypesError::InvalidProposal(format!(
                "need at least 2 participants, got {}",
                self.participants.len()
            )));
        }
        if self.participants.len() != self.init_alloc.num_parts() {
            return Err(TypesError::InvalidProposal(format!(
                "{} participants but {} balances",
                self.participants.len(),
                self.init_alloc.num_parts()
            )));
        }
        let distinct: HashSet<&WireAddress> = self.participants.iter().collect();
        if distinct.len() != self.participants.len() {
            return Err(TypesError::InvalidProposal(
                "participants must be distinct".to_string(),
            ));
        }
        self.init_alloc.total()?;
        Ok(())
    }

    pub fn num_peers(&self) -> usize {
        self.participants.len()
    }
}

/// The responder's answer to an accepted proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalAcceptance {
    /// Responder's on-chain account.
    pub participant: ChainAddress,
}

/// A proposed transition to a new channel state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// Participant that initiated the update.
    pub actor_idx: PartIdx,
    pub state: ChannelState,
}

/// On-chain events reported to a channel watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjudicatorEvent {
    /// A state was registered on chain; a challenge window is running.
    Registered {
        channel_id: ChannelId,
        version: u64,
        timeout_secs: u64,
    },
    /// The channel was concluded on chain and funds may be withdrawn.
    Concluded { channel_id: ChannelId, version: u64 },
}

impl AdjudicatorEvent {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            AdjudicatorEvent::Registered { channel_id, .. }
            | AdjudicatorEvent::Concluded { channel_id, .. } => *channel_id,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            AdjudicatorEvent::Registered { version, .. }
            | AdjudicatorEvent::Concluded { version, .. } => *version,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdjudicatorEvent::Registered { .. } => "registered",
            AdjudicatorEvent::Concluded { .. } => "concluded",
        }
    }
}
