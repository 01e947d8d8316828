//! In-process protocol backend.
//!
//! Engines attached to the same [`LocalBus`] can open two-party ledger
//! channels with each other. A shared [`LocalLedger`] plays the chain: it
//! answers balance queries, locks deposits and concludes channels.

mod bus;
mod channel;
mod engine;
mod ledger;

pub use bus::LocalBus;
pub use channel::LocalChannel;
pub use engine::{LocalEngine, DEFAULT_RESPONSE_TIMEOUT};
pub use ledger::LocalLedger;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Mutex};

    use paychan_types::{
        AdjudicatorEvent, Allocation, Amount, Asset, ChainAddress, ChannelProposal, ChannelState,
        ChannelUpdate, ProposalAcceptance, WireAddress,
    };

    use super::*;
    use crate::engine::{
        AdjudicatorEventHandler, ChannelHandle, ProposalHandler, ProposalResponder,
        ProtocolEngine, StateUpdateListener, UpdateDecision, UpdateHandler,
    };
    use crate::error::EngineError;

    /// Accepts everything and forwards accepted channels.
    struct AcceptAll {
        account: ChainAddress,
        accepted: mpsc::Sender<Arc<dyn ChannelHandle>>,
        reject_updates: bool,
    }

    #[async_trait]
    impl ProposalHandler for AcceptAll {
        async fn handle_proposal(
            &self,
            _proposal: ChannelProposal,
            responder: Box<dyn ProposalResponder>,
        ) {
            let channel = responder
                .accept(ProposalAcceptance {
                    participant: self.account,
                })
                .await
                .unwrap();
            self.accepted.send(channel).await.unwrap();
        }
    }

    #[async_trait]
    impl UpdateHandler for AcceptAll {
        async fn handle_update(&self, _: &ChannelState, _: &ChannelUpdate) -> UpdateDecision {
            if self.reject_updates {
                UpdateDecision::Reject("not today".to_string())
            } else {
                UpdateDecision::Accept
            }
        }
    }

    struct RejectAll;

    #[async_trait]
    impl ProposalHandler for RejectAll {
        async fn handle_proposal(&self, _: ChannelProposal, responder: Box<dyn ProposalResponder>) {
            responder.reject("busy").await.unwrap();
        }
    }

    #[async_trait]
    impl UpdateHandler for RejectAll {
        async fn handle_update(&self, _: &ChannelState, _: &ChannelUpdate) -> UpdateDecision {
            UpdateDecision::Reject("busy".to_string())
        }
    }

    /// Never answers; records when its pending call is dropped.
    #[derive(Default)]
    struct Stall {
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ProposalHandler for Stall {
        async fn handle_proposal(&self, _: ChannelProposal, responder: Box<dyn ProposalResponder>) {
            let _flag = DropFlag(self.dropped.clone());
            let _responder = responder;
            std::future::pending::<()>().await;
        }
    }

    #[async_trait]
    impl UpdateHandler for Stall {
        async fn handle_update(&self, _: &ChannelState, _: &ChannelUpdate) -> UpdateDecision {
            UpdateDecision::Accept
        }
    }

    #[derive(Default)]
    struct Recorder {
        versions: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl StateUpdateListener for Recorder {
        async fn on_state_update(&self, _from: Option<&ChannelState>, to: &ChannelState) {
            self.versions.lock().await.push(to.version);
        }
    }

    #[derive(Default)]
    struct EventCounter {
        concluded: AtomicUsize,
    }

    impl AdjudicatorEventHandler for EventCounter {
        fn handle_adjudicator_event(&self, event: AdjudicatorEvent) {
            if matches!(event, AdjudicatorEvent::Concluded { .. }) {
                self.concluded.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct Pair {
        ledger: Arc<LocalLedger>,
        alice: LocalEngine,
        bob: LocalEngine,
        alice_account: ChainAddress,
        bob_account: ChainAddress,
    }

    async fn pair() -> Pair {
        let ledger = Arc::new(LocalLedger::new());
        let bus = LocalBus::new();
        let alice_account = ChainAddress::from_seed("alice");
        let bob_account = ChainAddress::from_seed("bob");
        ledger.mint(alice_account, Amount(1_000)).await.unwrap();
        ledger.mint(bob_account, Amount(1_000)).await.unwrap();

        let alice = LocalEngine::new(
            WireAddress::from("alice"),
            bus.clone(),
            ledger.clone(),
            ledger.clone(),
        )
        .await
        .unwrap();
        let bob = LocalEngine::new(
            WireAddress::from("bob"),
            bus,
            ledger.clone(),
            ledger.clone(),
        )
        .await
        .unwrap();

        Pair {
            ledger,
            alice,
            bob,
            alice_account,
            bob_account,
        }
    }

    fn proposal(from: ChainAddress) -> ChannelProposal {
        ChannelProposal::ledger(
            10,
            from,
            Allocation::two_party(Asset::ckb(), Amount(100), Amount(100)),
            vec![WireAddress::from("alice"), WireAddress::from("bob")],
        )
        .unwrap()
    }

    async fn open(p: &Pair, reject_updates: bool) -> (Arc<dyn ChannelHandle>, Arc<dyn ChannelHandle>) {
        let (tx, mut rx) = mpsc::channel(1);
        let bob_handler = Arc::new(AcceptAll {
            account: p.bob_account,
            accepted: tx,
            reject_updates,
        });
        p.bob.handle(bob_handler.clone(), bob_handler).await;

        let (alice_tx, _alice_rx) = mpsc::channel(1);
        let alice_handler = Arc::new(AcceptAll {
            account: p.alice_account,
            accepted: alice_tx,
            reject_updates: false,
        });
        p.alice.handle(alice_handler.clone(), alice_handler).await;

        let ours = p.alice.propose_channel(proposal(p.alice_account)).await.unwrap();
        let theirs = rx.recv().await.unwrap();
        (ours, theirs)
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let p = pair().await;
        let bus = LocalBus::new();
        let _first = LocalEngine::new(
            WireAddress::from("carol"),
            bus.clone(),
            p.ledger.clone(),
            p.ledger.clone(),
        )
        .await
        .unwrap();
        let second = LocalEngine::new(
            WireAddress::from("carol"),
            bus,
            p.ledger.clone(),
            p.ledger.clone(),
        )
        .await;
        assert!(matches!(second, Err(EngineError::AddressInUse(_))));
    }

    #[tokio::test]
    async fn test_open_funds_both_sides() {
        let p = pair().await;
        let (ours, theirs) = open(&p, false).await;

        assert_eq!(ours.id(), theirs.id());
        assert_eq!(ours.idx(), 0);
        assert_eq!(theirs.idx(), 1);
        assert_eq!(ours.state().await.version, 0);
        assert_eq!(p.ledger.balance_of(&p.alice_account).await, Amount(900));
        assert_eq!(p.ledger.balance_of(&p.bob_account).await, Amount(900));
        assert_eq!(p.ledger.deposited(ours.id()).await, Amount(200));
    }

    #[tokio::test]
    async fn test_rejected_proposal() {
        let p = pair().await;
        p.bob.handle(Arc::new(RejectAll), Arc::new(RejectAll)).await;

        let err = p
            .alice
            .propose_channel(proposal(p.alice_account))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::ProposalRejected(reason) if reason == "busy"));
    }

    #[tokio::test]
    async fn test_peer_without_handlers() {
        let p = pair().await;
        let err = p
            .alice
            .propose_channel(proposal(p.alice_account))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::PeerNotHandling(_)));
    }

    #[tokio::test]
    async fn test_closed_peer_unreachable() {
        let p = pair().await;
        p.bob.close().await.unwrap();
        let err = p
            .alice
            .propose_channel(proposal(p.alice_account))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::PeerUnreachable(_)));
    }

    #[tokio::test]
    async fn test_update_notifies_both_sides() {
        let p = pair().await;
        let (ours, theirs) = open(&p, false).await;
        let alice_rec = Arc::new(Recorder::default());
        let bob_rec = Arc::new(Recorder::default());
        ours.on_update(alice_rec.clone()).await;
        theirs.on_update(bob_rec.clone()).await;

        let mut next = ours.state().await.allocation;
        next.transfer(0, 1, Amount(30)).unwrap();
        ours.update(next, false).await.unwrap();

        let state = theirs.state().await;
        assert_eq!(state.version, 1);
        assert_eq!(state.balance(0).unwrap(), Amount(70));
        assert_eq!(state.balance(1).unwrap(), Amount(130));
        assert_eq!(*alice_rec.versions.lock().await, vec![1]);
        assert_eq!(*bob_rec.versions.lock().await, vec![1]);
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_state() {
        let p = pair().await;
        let (ours, _theirs) = open(&p, true).await;

        let before = ours.state().await;
        let mut next = before.allocation.clone();
        next.transfer(0, 1, Amount(10)).unwrap();

        let err = ours.update(next, false).await.unwrap_err();
        assert!(matches!(err, EngineError::UpdateRejected(_)));
        assert_eq!(ours.state().await, before);
    }

    #[tokio::test]
    async fn test_update_must_conserve_total() {
        let p = pair().await;
        let (ours, _theirs) = open(&p, false).await;

        let inflated = Allocation::two_party(Asset::ckb(), Amount(100), Amount(200));
        let err = ours.update(inflated, false).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidUpdate(_)));
    }

    #[tokio::test]
    async fn test_settle_pays_out_and_stops_watchers() {
        let p = pair().await;
        let (ours, theirs) = open(&p, false).await;

        let counter = Arc::new(EventCounter::default());
        let watcher = {
            let theirs = theirs.clone();
            let counter = counter.clone();
            tokio::spawn(async move { theirs.watch(counter).await })
        };

        assert!(matches!(
            ours.settle().await,
            Err(EngineError::NotFinal(_))
        ));

        let mut next = ours.state().await.allocation;
        next.transfer(0, 1, Amount(30)).unwrap();
        ours.update(next.clone(), false).await.unwrap();
        ours.update(next.clone(), true).await.unwrap();
        assert!(matches!(
            ours.update(next, false).await,
            Err(EngineError::ChannelFinal(_))
        ));

        ours.settle().await.unwrap();
        theirs.settle().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(counter.concluded.load(Ordering::SeqCst), 1);
        assert_eq!(p.ledger.balance_of(&p.alice_account).await, Amount(970));
        assert_eq!(p.ledger.balance_of(&p.bob_account).await, Amount(1_030));
    }

    #[tokio::test]
    async fn test_watch_after_conclusion_returns_immediately() {
        let p = pair().await;
        let (ours, _theirs) = open(&p, false).await;
        let alloc = ours.state().await.allocation;
        ours.update(alloc, true).await.unwrap();
        ours.settle().await.unwrap();

        let counter = Arc::new(EventCounter::default());
        ours.watch(counter.clone()).await.unwrap();
        assert_eq!(counter.concluded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_refuses_updates() {
        let p = pair().await;
        let (ours, _theirs) = open(&p, false).await;
        ours.close().await.unwrap();

        let alloc = ours.state().await.allocation;
        assert!(matches!(
            ours.update(alloc, false).await,
            Err(EngineError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_engine_cannot_propose() {
        let p = pair().await;
        p.alice.close().await.unwrap();
        assert!(matches!(
            p.alice.propose_channel(proposal(p.alice_account)).await,
            Err(EngineError::EngineClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_drops_pending_proposal_dispatch() {
        let p = pair().await;
        let stall = Arc::new(Stall::default());
        p.bob.handle(stall.clone(), stall.clone()).await;

        let (proposed, closed) = tokio::join!(
            p.alice.propose_channel(proposal(p.alice_account)),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tokio::time::timeout(Duration::from_secs(1), p.bob.close()).await
            }
        );

        assert!(closed.unwrap().is_ok());
        assert!(stall.dropped.load(Ordering::SeqCst));
        assert!(matches!(proposed, Err(EngineError::ProposalRejected(_))));
        assert_eq!(p.ledger.balance_of(&p.alice_account).await, Amount(1_000));
    }
}
