//! Two-party channel engine running entirely in process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use paychan_types::{
    ChannelId, ChannelParams, ChannelProposal, ChannelState, Participant, ProposalAcceptance,
    WireAddress, PROPOSER_IDX, RESPONDER_IDX,
};

use super::bus::LocalBus;
use super::channel::{LocalChannel, SharedChannel};
use crate::chain::{Adjudicator, Funder, FundingRequest};
use crate::engine::{ChannelHandle, ProposalHandler, ProposalResponder, ProtocolEngine, UpdateHandler};
use crate::error::{EngineError, EngineResult};

/// How long a proposer waits for the peer's answer by default.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type ProposalReply = EngineResult<Arc<SharedChannel>>;

#[derive(Clone)]
struct Handlers {
    proposals: Arc<dyn ProposalHandler>,
    updates: Arc<dyn UpdateHandler>,
}

/// Engine state reachable from the bus and from open channels.
pub(crate) struct EngineInner {
    address: WireAddress,
    funder: Arc<dyn Funder>,
    adjudicator: Arc<dyn Adjudicator>,
    handlers: RwLock<Option<Handlers>>,
    closed: AtomicBool,
    /// Inbound proposal dispatches. Cancelled and drained on close.
    dispatches: TaskTracker,
    shutdown: CancellationToken,
}

impl EngineInner {
    pub(crate) fn address(&self) -> &WireAddress {
        &self.address
    }

    pub(crate) fn funder(&self) -> &Arc<dyn Funder> {
        &self.funder
    }

    pub(crate) fn adjudicator(&self) -> &Arc<dyn Adjudicator> {
        &self.adjudicator
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) async fn update_handler(&self) -> Option<Arc<dyn UpdateHandler>> {
        self.handlers.read().await.as_ref().map(|h| h.updates.clone())
    }

    async fn proposal_handler(&self) -> Option<Arc<dyn ProposalHandler>> {
        self.handlers.read().await.as_ref().map(|h| h.proposals.clone())
    }

    /// Run `handler` on an inbound proposal until it finishes or this engine
    /// closes. Dropping the responder unanswered rejects the proposal.
    fn dispatch_proposal(
        &self,
        handler: Arc<dyn ProposalHandler>,
        proposal: ChannelProposal,
        responder: LocalProposalResponder,
    ) {
        let shutdown = self.shutdown.clone();
        let channel_id = responder.channel_id;
        self.dispatches.spawn(async move {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Dropping proposal {}: engine closed", channel_id);
                }
                _ = handler.handle_proposal(proposal, Box::new(responder)) => {}
            }
        });
    }
}

/// In-process [`ProtocolEngine`] for two-party ledger channels.
pub struct LocalEngine {
    inner: Arc<EngineInner>,
    bus: LocalBus,
    response_timeout: Duration,
}

impl LocalEngine {
    /// Create an engine and attach it to `bus` under `address`.
    pub async fn new(
        address: WireAddress,
        bus: LocalBus,
        funder: Arc<dyn Funder>,
        adjudicator: Arc<dyn Adjudicator>,
    ) -> EngineResult<Self> {
        let inner = Arc::new(EngineInner {
            address,
            funder,
            adjudicator,
            handlers: RwLock::new(None),
            closed: AtomicBool::new(false),
            dispatches: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        });
        bus.register(inner.clone()).await?;

        Ok(Self {
            inner,
            bus,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    async fn fund(
        inner: &EngineInner,
        params: &ChannelParams,
        state: &ChannelState,
        idx: usize,
    ) -> EngineResult<()> {
        let request = FundingRequest {
            channel_id: params.id,
            idx,
            num_parts: params.participants.len(),
            account: params.participants[idx].chain,
            amount: state.balance(idx)?,
        };
        inner.funder().fund(&request).await
    }
}

#[async_trait]
impl ProtocolEngine for LocalEngine {
    fn address(&self) -> &WireAddress {
        self.inner.address()
    }

    async fn propose_channel(
        &self,
        proposal: ChannelProposal,
    ) -> EngineResult<Arc<dyn ChannelHandle>> {
        if self.inner.is_closed() {
            return Err(EngineError::EngineClosed);
        }
        proposal.validate()?;

        if proposal.participants.len() != 2 {
            return Err(EngineError::InvalidProposal(format!(
                "local engine supports two-party channels, got {} participants",
                proposal.participants.len()
            )));
        }
        if proposal.participants[PROPOSER_IDX] != self.inner.address {
            return Err(EngineError::InvalidProposal(format!(
                "proposer must be participant 0, found {}",
                proposal.participants[PROPOSER_IDX]
            )));
        }

        let peer_address = proposal.participants[RESPONDER_IDX].clone();
        let peer = self
            .bus
            .lookup(&peer_address)
            .await
            .filter(|peer| !peer.is_closed())
            .ok_or_else(|| EngineError::PeerUnreachable(peer_address.clone()))?;
        let proposals = peer
            .proposal_handler()
            .await
            .ok_or_else(|| EngineError::PeerNotHandling(peer_address.clone()))?;

        let channel_id = ChannelId::new_random();
        let (reply_tx, reply_rx) = oneshot::channel();
        let responder = LocalProposalResponder {
            channel_id,
            proposal: proposal.clone(),
            proposer: self.inner.clone(),
            responder: peer.clone(),
            reply: Mutex::new(Some(reply_tx)),
        };

        info!("Proposing channel {} to {}", channel_id, peer_address);
        peer.dispatch_proposal(proposals, proposal, responder);

        let shared = match tokio::time::timeout(self.response_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_)) => {
                return Err(EngineError::ProposalRejected(
                    "peer dropped the proposal without answering".to_string(),
                ))
            }
            Err(_) => {
                return Err(EngineError::Timeout(format!(
                    "no answer from {} within {:?}",
                    peer_address, self.response_timeout
                )))
            }
        };

        let state = shared.snapshot().await;
        if let Err(e) = Self::fund(&self.inner, shared.params(), &state, PROPOSER_IDX).await {
            warn!("Funding channel {} failed: {}", channel_id, e);
            shared.mark_closed(PROPOSER_IDX).await;
            return Err(e);
        }

        info!("Channel {} opened with {}", channel_id, peer_address);
        Ok(Arc::new(LocalChannel::new(shared, PROPOSER_IDX)))
    }

    async fn handle(&self, proposals: Arc<dyn ProposalHandler>, updates: Arc<dyn UpdateHandler>) {
        let mut handlers = self.inner.handlers.write().await;
        *handlers = Some(Handlers { proposals, updates });
        debug!("Handlers installed for {}", self.inner.address);
    }

    async fn close(&self) -> EngineResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.handlers.write().await.take();
        self.bus.remove(&self.inner.address).await;

        self.inner.shutdown.cancel();
        self.inner.dispatches.close();
        self.inner.dispatches.wait().await;
        info!("Engine {} closed", self.inner.address);
        Ok(())
    }
}

/// Answers one proposal on behalf of the responding engine.
struct LocalProposalResponder {
    channel_id: ChannelId,
    proposal: ChannelProposal,
    proposer: Arc<EngineInner>,
    responder: Arc<EngineInner>,
    reply: Mutex<Option<oneshot::Sender<ProposalReply>>>,
}

impl LocalProposalResponder {
    async fn take_reply(&self) -> EngineResult<oneshot::Sender<ProposalReply>> {
        self.reply
            .lock()
            .await
            .take()
            .ok_or(EngineError::AlreadyResponded)
    }
}

#[async_trait]
impl ProposalResponder for LocalProposalResponder {
    async fn accept(
        &self,
        acceptance: ProposalAcceptance,
    ) -> EngineResult<Arc<dyn ChannelHandle>> {
        let reply = self.take_reply().await?;
        if self.responder.is_closed() {
            let _ = reply.send(Err(EngineError::PeerUnreachable(
                self.responder.address().clone(),
            )));
            return Err(EngineError::EngineClosed);
        }

        let params = ChannelParams {
            id: self.channel_id,
            participants: vec![
                Participant {
                    wire: self.proposer.address().clone(),
                    chain: self.proposal.proposer,
                },
                Participant {
                    wire: self.responder.address().clone(),
                    chain: acceptance.participant,
                },
            ],
            challenge_duration_secs: self.proposal.challenge_duration_secs,
        };
        let state = ChannelState::initial(self.channel_id, self.proposal.init_alloc.clone());

        if let Err(e) = LocalEngine::fund(&self.responder, &params, &state, RESPONDER_IDX).await {
            let _ = reply.send(Err(EngineError::ProposalRejected(format!(
                "responder funding failed: {}",
                e
            ))));
            return Err(e);
        }

        let shared = Arc::new(SharedChannel::new(
            params,
            state,
            [self.proposer.clone(), self.responder.clone()],
        ));
        if reply.send(Ok(shared.clone())).is_err() {
            shared.mark_closed(RESPONDER_IDX).await;
            return Err(EngineError::Timeout(
                "proposer stopped waiting for the answer".to_string(),
            ));
        }

        debug!("Accepted channel {}", self.channel_id);
        Ok(Arc::new(LocalChannel::new(shared, RESPONDER_IDX)))
    }

    async fn reject(&self, reason: &str) -> EngineResult<()> {
        let reply = self.take_reply().await?;
        debug!("Rejecting channel {}: {}", self.channel_id, reason);
        let _ = reply.send(Err(EngineError::ProposalRejected(reason.to_string())));
        Ok(())
    }
}
