//! Common test utilities and infrastructure for integration tests.
//!
//! Every test gets its own in-process chain and wire bus, so tests can run in
//! parallel without sharing state.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use paychan_client::{ClientConfig, Observer, ObserverId, PaymentClient};
use paychan_protocol::{
    LocalBus, LocalEngine, LocalLedger, ProposalHandler, ProposalResponder, ProtocolEngine,
    UpdateDecision, UpdateHandler,
};
use paychan_types::{
    Amount, Asset, ChainAddress, ChannelProposal, ChannelState, ChannelUpdate, ClientIdentity,
    Network, ProposalAcceptance, WireAddress,
};

/// Upper bound for anything a test waits on.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared chain and transport for a group of clients.
pub struct TestContext {
    pub ledger: Arc<LocalLedger>,
    pub bus: LocalBus,
    pub asset: Asset,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(LocalLedger::new()),
            bus: LocalBus::new(),
            asset: Asset::ckb(),
        }
    }

    /// Whole units of the test asset.
    pub fn units(&self, units: u64) -> Amount {
        self.asset.whole(units).unwrap()
    }

    pub fn config() -> ClientConfig {
        ClientConfig {
            balance_poll_interval_ms: 20,
            ..ClientConfig::default()
        }
    }

    /// Start a client named `name` holding `funds` whole units on chain.
    pub async fn client(&self, name: &str, funds: u64) -> PaymentClient {
        let identity = ClientIdentity::local(name, Network::Devnet, self.asset.clone());
        self.ledger
            .mint(identity.account.address(), self.units(funds))
            .await
            .unwrap();

        let engine = LocalEngine::new(
            identity.wire_address.clone(),
            self.bus.clone(),
            self.ledger.clone(),
            self.ledger.clone(),
        )
        .await
        .unwrap();

        PaymentClient::new(identity, Self::config(), Arc::new(engine), self.ledger.clone())
            .await
            .unwrap()
    }

    /// A raw engine peer that answers proposals and updates with fixed verdicts.
    pub async fn scripted_peer(
        &self,
        name: &str,
        funds: u64,
        accept_proposals: bool,
        accept_updates: bool,
    ) -> (LocalEngine, WireAddress) {
        let chain = ChainAddress::from_seed(name);
        self.ledger.mint(chain, self.units(funds)).await.unwrap();

        let wire = WireAddress::from(chain);
        let engine = LocalEngine::new(
            wire.clone(),
            self.bus.clone(),
            self.ledger.clone(),
            self.ledger.clone(),
        )
        .await
        .unwrap();

        let peer = Arc::new(ScriptedPeer {
            account: chain,
            accept_proposals,
            accept_updates,
        });
        engine.handle(peer.clone(), peer).await;
        (engine, wire)
    }

    /// Open a channel from `proposer` to `responder` and adopt it on both sides.
    pub async fn open(
        &self,
        proposer: &PaymentClient,
        responder: &PaymentClient,
        deposit: u64,
    ) -> paychan_types::ChannelId {
        let (opened, accepted) = tokio::join!(
            proposer.open_channel(responder.wire_address().clone(), self.units(deposit)),
            responder.accept_pending_channel(),
        );
        let id = opened.unwrap();
        assert_eq!(accepted.unwrap(), id);
        id
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-level peer with fixed answers.
pub struct ScriptedPeer {
    account: ChainAddress,
    accept_proposals: bool,
    accept_updates: bool,
}

#[async_trait]
impl ProposalHandler for ScriptedPeer {
    async fn handle_proposal(&self, _proposal: ChannelProposal, responder: Box<dyn ProposalResponder>) {
        if self.accept_proposals {
            let _ = responder
                .accept(ProposalAcceptance {
                    participant: self.account,
                })
                .await;
        } else {
            let _ = responder.reject("not today").await;
        }
    }
}

#[async_trait]
impl UpdateHandler for ScriptedPeer {
    async fn handle_update(&self, _current: &ChannelState, _update: &ChannelUpdate) -> UpdateDecision {
        if self.accept_updates {
            UpdateDecision::Accept
        } else {
            UpdateDecision::Reject("frozen".to_string())
        }
    }
}

/// Observer that remembers everything it was told.
pub struct RecordingObserver {
    id: ObserverId,
    states: Mutex<Vec<String>>,
    balances: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ObserverId::new_random(),
            states: Mutex::new(Vec::new()),
            balances: Mutex::new(Vec::new()),
        })
    }

    pub fn states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }

    pub fn balances(&self) -> Vec<String> {
        self.balances.lock().unwrap().clone()
    }

    pub fn last_state(&self) -> Option<String> {
        self.states.lock().unwrap().last().cloned()
    }

    /// Whether any received state contains all of `needles`.
    pub fn saw_state_with(&self, needles: &[&str]) -> bool {
        self.states
            .lock()
            .unwrap()
            .iter()
            .any(|s| needles.iter().all(|n| s.contains(n)))
    }
}

impl Observer for RecordingObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn update_state(&self, state: &str) {
        self.states.lock().unwrap().push(state.to_string());
    }

    fn update_balance(&self, balance: &str) {
        self.balances.lock().unwrap().push(balance.to_string());
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {}", what);
}
