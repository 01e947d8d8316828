//! In-memory ledger acting as chain query client, funder and adjudicator.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use paychan_types::{
    AdjudicatorEvent, Amount, ChainAddress, ChannelId, ChannelParams, ChannelState, PartIdx,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::chain::{Adjudicator, ChainClient, Funder, FundingRequest};
use crate::error::{EngineError, EngineResult};

/// Capacity of the adjudicator event stream.
const EVENT_BUFFER: usize = 64;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<ChainAddress, Amount>,
    /// Per-channel deposits indexed by participant.
    deposits: HashMap<ChannelId, Vec<Amount>>,
    concluded: HashMap<ChannelId, ChannelState>,
    withdrawn: HashSet<(ChannelId, PartIdx)>,
}

/// Shared in-process chain.
pub struct LocalLedger {
    state: Mutex<LedgerState>,
    events: broadcast::Sender<AdjudicatorEvent>,
}

impl LocalLedger {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(LedgerState::default()),
            events,
        }
    }

    /// Credit an account out of thin air (faucet).
    pub async fn mint(&self, account: ChainAddress, amount: Amount) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        let balance = state.balances.entry(account).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| EngineError::Chain(format!("balance overflow for {}", account)))?;
        debug!("Minted {} to {}", amount, account);
        Ok(())
    }

    pub async fn balance_of(&self, account: &ChainAddress) -> Amount {
        let state = self.state.lock().await;
        state.balances.get(account).copied().unwrap_or_default()
    }

    /// Total currently locked in a channel.
    pub async fn deposited(&self, channel_id: ChannelId) -> Amount {
        let state = self.state.lock().await;
        state
            .deposits
            .get(&channel_id)
            .map(|d| d.iter().fold(Amount::ZERO, |acc, a| acc.saturating_add(*a)))
            .unwrap_or_default()
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for LocalLedger {
    async fn get_balance(&self, account: &ChainAddress) -> EngineResult<Amount> {
        Ok(self.balance_of(account).await)
    }
}

#[async_trait]
impl Funder for LocalLedger {
    async fn fund(&self, request: &FundingRequest) -> EngineResult<()> {
        if request.idx >= request.num_parts {
            return Err(EngineError::InvalidProposal(format!(
                "funding index {} out of range for {} participants",
                request.idx, request.num_parts
            )));
        }

        let mut state = self.state.lock().await;
        let available = state
            .balances
            .get(&request.account)
            .copied()
            .unwrap_or_default();
        let remaining =
            available
                .checked_sub(request.amount)
                .ok_or(EngineError::InsufficientFunds {
                    account: request.account,
                    available,
                    required: request.amount,
                })?;
        state.balances.insert(request.account, remaining);

        let deposits = state
            .deposits
            .entry(request.channel_id)
            .or_insert_with(|| vec![Amount::ZERO; request.num_parts]);
        deposits[request.idx] = deposits[request.idx].saturating_add(request.amount);

        info!(
            "Funded channel {} with {} from {} (participant {})",
            request.channel_id, request.amount, request.account, request.idx
        );
        Ok(())
    }
}

#[async_trait]
impl Adjudicator for LocalLedger {
    async fn conclude(&self, params: &ChannelParams, state: &ChannelState) -> EngineResult<()> {
        let reject = |reason: String| EngineError::Adjudication {
            channel_id: params.id,
            reason,
        };

        if state.id != params.id {
            return Err(reject(format!("state belongs to channel {}", state.id)));
        }
        if !state.is_final {
            return Err(EngineError::NotFinal(params.id));
        }

        let mut ledger = self.state.lock().await;
        if ledger.concluded.contains_key(&params.id) {
            return Ok(());
        }

        let locked = ledger
            .deposits
            .get(&params.id)
            .map(|d| d.iter().fold(Amount::ZERO, |acc, a| acc.saturating_add(*a)))
            .unwrap_or_default();
        let owed = state.allocation.total()?;
        if owed > locked {
            return Err(reject(format!(
                "final state pays out {} but only {} is locked",
                owed, locked
            )));
        }

        ledger.concluded.insert(params.id, state.clone());
        drop(ledger);

        info!("Concluded channel {} at version {}", params.id, state.version);
        // No subscribers is fine: watchers may not be running.
        let _ = self.events.send(AdjudicatorEvent::Concluded {
            channel_id: params.id,
            version: state.version,
        });
        Ok(())
    }

    async fn withdraw(&self, params: &ChannelParams, idx: PartIdx) -> EngineResult<Amount> {
        let participant = params.participants.get(idx).ok_or_else(|| EngineError::Adjudication {
            channel_id: params.id,
            reason: format!("no participant at index {}", idx),
        })?;

        let mut ledger = self.state.lock().await;
        let payout = match ledger.concluded.get(&params.id) {
            Some(state) => state.balance(idx)?,
            None => {
                return Err(EngineError::Adjudication {
                    channel_id: params.id,
                    reason: "channel not concluded".to_string(),
                })
            }
        };
        if !ledger.withdrawn.insert((params.id, idx)) {
            return Ok(Amount::ZERO);
        }

        let balance = ledger.balances.entry(participant.chain).or_default();
        *balance = balance.saturating_add(payout);
        if let Some(deposits) = ledger.deposits.get_mut(&params.id) {
            // Payouts may shift value between participants; only the total is tracked.
            let mut left = payout;
            for deposit in deposits.iter_mut() {
                let taken = (*deposit).min(left);
                *deposit = deposit.saturating_sub(taken);
                left = left.saturating_sub(taken);
            }
        }

        info!(
            "Withdrew {} from channel {} to {}",
            payout, params.id, participant.chain
        );
        Ok(payout)
    }

    fn subscribe(&self) -> broadcast::Receiver<AdjudicatorEvent> {
        self.events.subscribe()
    }

    async fn concluded_event(&self, channel_id: ChannelId) -> Option<AdjudicatorEvent> {
        let ledger = self.state.lock().await;
        ledger
            .concluded
            .get(&channel_id)
            .map(|state| AdjudicatorEvent::Concluded {
                channel_id,
                version: state.version,
            })
    }
}
