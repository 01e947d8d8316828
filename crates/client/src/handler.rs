//! Callbacks the protocol engine invokes on the client.

use std::sync::Arc;

use async_trait::async_trait;
use paychan_protocol::{
    AdjudicatorEventHandler, ProposalHandler, ProposalResponder, UpdateDecision, UpdateHandler,
};
use paychan_types::{
    ChannelProposal, ChannelState, ChannelUpdate, ClientIdentity, ProposalAcceptance,
    RESPONDER_IDX,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::channel::PaymentChannel;
use crate::mailbox::ChannelMailbox;
use crate::watcher::spawn_watcher;

/// Decides on inbound proposals and updates for one client.
pub struct ClientHandler {
    identity: Arc<ClientIdentity>,
    mailbox: Arc<ChannelMailbox>,
    reporter: Arc<dyn AdjudicatorEventHandler>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl ClientHandler {
    pub fn new(
        identity: Arc<ClientIdentity>,
        mailbox: Arc<ChannelMailbox>,
        reporter: Arc<dyn AdjudicatorEventHandler>,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            identity,
            mailbox,
            reporter,
            tracker,
            shutdown,
        }
    }

    /// Why a proposal is unacceptable, if it is.
    fn proposal_objection(&self, proposal: &ChannelProposal) -> Option<String> {
        if proposal.num_peers() != 2 {
            return Some(format!(
                "expected 2 participants, got {}",
                proposal.num_peers()
            ));
        }
        if proposal.init_alloc.asset != self.identity.asset {
            return Some(format!(
                "unsupported asset {}, expected {}",
                proposal.init_alloc.asset, self.identity.asset
            ));
        }
        if proposal.participants[RESPONDER_IDX] != self.identity.wire_address {
            return Some(format!(
                "proposal addressed to {}, not {}",
                proposal.participants[RESPONDER_IDX], self.identity.wire_address
            ));
        }
        if let Err(e) = proposal.validate() {
            return Some(e.to_string());
        }
        None
    }

    /// Why an update is unacceptable, if it is. We only accept updates that
    /// pay us (or leave us unchanged) and keep the total.
    fn update_objection(current: &ChannelState, update: &ChannelUpdate) -> Option<String> {
        let before = &current.allocation;
        let after = &update.state.allocation;

        if after.num_parts() != 2 || update.actor_idx > 1 {
            return Some("only two-party updates are supported".to_string());
        }
        if after.asset != before.asset {
            return Some(format!("asset changed to {}", after.asset));
        }
        match (before.total(), after.total()) {
            (Ok(a), Ok(b)) if a == b => {}
            _ => return Some("allocation total not conserved".to_string()),
        }

        let receiver = 1 - update.actor_idx;
        match (before.balance(receiver), after.balance(receiver)) {
            (Ok(old), Ok(new)) if new >= old => None,
            (Ok(old), Ok(new)) => Some(format!(
                "update would lower our balance from {} to {}",
                old, new
            )),
            _ => Some("malformed allocation".to_string()),
        }
    }
}

#[async_trait]
impl ProposalHandler for ClientHandler {
    async fn handle_proposal(
        &self,
        proposal: ChannelProposal,
        responder: Box<dyn ProposalResponder>,
    ) {
        if let Some(reason) = self.proposal_objection(&proposal) {
            warn!("{} rejecting channel proposal: {}", self.identity.name, reason);
            if let Err(e) = responder.reject(&reason).await {
                warn!("Failed to reject proposal: {}", e);
            }
            return;
        }

        let acceptance = ProposalAcceptance {
            participant: self.identity.account.address(),
        };
        let handle = match responder.accept(acceptance).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{} failed to accept channel: {}", self.identity.name, e);
                return;
            }
        };
        info!(
            "{} accepted channel {} from {}",
            self.identity.name,
            handle.id(),
            proposal.participants[0]
        );

        spawn_watcher(
            &self.tracker,
            self.shutdown.clone(),
            handle.clone(),
            self.reporter.clone(),
        );

        let channel = PaymentChannel::new(handle, self.identity.asset.clone());
        if let Err((e, channel)) = self.mailbox.deliver(channel, &self.shutdown).await {
            warn!("Dropping accepted channel {}: {}", channel.id(), e);
            if let Err(e) = channel.handle().close().await {
                debug!("Closing dropped channel failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl UpdateHandler for ClientHandler {
    async fn handle_update(&self, current: &ChannelState, update: &ChannelUpdate) -> UpdateDecision {
        match Self::update_objection(current, update) {
            None => {
                debug!(
                    "{} accepting update to version {}",
                    self.identity.name, update.state.version
                );
                UpdateDecision::Accept
            }
            Some(reason) => {
                warn!("{} rejecting update: {}", self.identity.name, reason);
                UpdateDecision::Reject(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::WatchReporter;
    use paychan_types::{Allocation, Amount, Asset, ChainAddress, ChannelId, Network, WireAddress};

    fn handler() -> ClientHandler {
        let identity = Arc::new(ClientIdentity::local("bob", Network::Devnet, Asset::ckb()));
        let reporter = Arc::new(WatchReporter::new("bob", identity.account.address()));
        ClientHandler::new(
            identity,
            Arc::new(ChannelMailbox::new()),
            reporter,
            TaskTracker::new(),
            CancellationToken::new(),
        )
    }

    fn proposal_to(handler: &ClientHandler, asset: Asset) -> ChannelProposal {
        ChannelProposal::ledger(
            10,
            ChainAddress::from_seed("alice"),
            Allocation::two_party(asset, Amount(100), Amount(100)),
            vec![
                WireAddress::from("alice"),
                handler.identity.wire_address.clone(),
            ],
        )
        .unwrap()
    }

    fn state(a: u128, b: u128) -> ChannelState {
        ChannelState::initial(
            ChannelId::new_random(),
            Allocation::two_party(Asset::ckb(), Amount(a), Amount(b)),
        )
    }

    fn update(actor_idx: usize, a: u128, b: u128, is_final: bool) -> ChannelUpdate {
        let mut next = state(a, b);
        next.version = 1;
        next.is_final = is_final;
        ChannelUpdate {
            actor_idx,
            state: next,
        }
    }

    #[test]
    fn test_proposal_policy() {
        let h = handler();
        assert_eq!(h.proposal_objection(&proposal_to(&h, Asset::ckb())), None);
        assert!(h
            .proposal_objection(&proposal_to(&h, Asset::new("USD", 2)))
            .is_some());

        let mut wrong_peer = proposal_to(&h, Asset::ckb());
        wrong_peer.participants[1] = WireAddress::from("carol");
        assert!(h.proposal_objection(&wrong_peer).is_some());
    }

    #[test]
    fn test_update_policy_accepts_incoming_payment() {
        let current = state(100, 100);
        assert_eq!(
            ClientHandler::update_objection(&current, &update(0, 70, 130, false)),
            None
        );
        assert_eq!(
            ClientHandler::update_objection(&current, &update(0, 100, 100, true)),
            None
        );
    }

    #[test]
    fn test_update_policy_rejects_outgoing_and_inflation() {
        let current = state(100, 100);
        assert!(ClientHandler::update_objection(&current, &update(0, 130, 70, false)).is_some());
        assert!(ClientHandler::update_objection(&current, &update(1, 70, 130, false)).is_some());
        assert!(ClientHandler::update_objection(&current, &update(0, 100, 150, false)).is_some());
    }

    #[tokio::test]
    async fn test_handle_update_decision() {
        let h = handler();
        let decision = h
            .handle_update(&state(100, 100), &update(0, 130, 70, false))
            .await;
        assert!(matches!(decision, UpdateDecision::Reject(_)));
    }
}
