//! Channel state shared by both participants of a local channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use paychan_types::{
    AdjudicatorEvent, Allocation, ChannelId, ChannelParams, ChannelState, ChannelUpdate, PartIdx,
};

use super::engine::EngineInner;
use crate::engine::{AdjudicatorEventHandler, ChannelHandle, StateUpdateListener, UpdateDecision};
use crate::error::{EngineError, EngineResult};

type Listeners = Vec<Arc<dyn StateUpdateListener>>;

/// One channel, seen from both sides. Each participant holds a
/// [`LocalChannel`] view onto it.
pub(crate) struct SharedChannel {
    params: ChannelParams,
    state: RwLock<ChannelState>,
    listeners: RwLock<[Listeners; 2]>,
    /// Serializes updates so versions advance one at a time.
    negotiation: Mutex<()>,
    closed: RwLock<[bool; 2]>,
    parties: [Arc<EngineInner>; 2],
}

impl SharedChannel {
    pub(crate) fn new(
        params: ChannelParams,
        state: ChannelState,
        parties: [Arc<EngineInner>; 2],
    ) -> Self {
        Self {
            params,
            state: RwLock::new(state),
            listeners: RwLock::new([Vec::new(), Vec::new()]),
            negotiation: Mutex::new(()),
            closed: RwLock::new([false, false]),
            parties,
        }
    }

    pub(crate) fn params(&self) -> &ChannelParams {
        &self.params
    }

    pub(crate) async fn snapshot(&self) -> ChannelState {
        self.state.read().await.clone()
    }

    pub(crate) async fn mark_closed(&self, idx: PartIdx) {
        self.closed.write().await[idx] = true;
        self.listeners.write().await[idx].clear();
    }

    async fn is_closed(&self, idx: PartIdx) -> bool {
        self.closed.read().await[idx]
    }

    fn check_transition(&self, current: &ChannelState, next: &Allocation) -> EngineResult<()> {
        let invalid = |reason: String| Err(EngineError::InvalidUpdate(reason));

        if next.asset != current.allocation.asset {
            return invalid(format!(
                "asset changed from {} to {}",
                current.allocation.asset, next.asset
            ));
        }
        if next.num_parts() != current.allocation.num_parts() {
            return invalid(format!(
                "{} balances for {} participants",
                next.num_parts(),
                current.allocation.num_parts()
            ));
        }
        let (before, after) = (current.allocation.total()?, next.total()?);
        if before != after {
            return invalid(format!("total changed from {} to {}", before, after));
        }
        Ok(())
    }

    async fn update(&self, idx: PartIdx, allocation: Allocation, is_final: bool) -> EngineResult<()> {
        let _turn = self.negotiation.lock().await;

        if self.is_closed(idx).await {
            return Err(EngineError::ChannelClosed(self.params.id));
        }
        let current = self.snapshot().await;
        if current.is_final {
            return Err(EngineError::ChannelFinal(self.params.id));
        }
        self.check_transition(&current, &allocation)?;

        let peer = &self.parties[1 - idx];
        if peer.is_closed() || self.is_closed(1 - idx).await {
            return Err(EngineError::PeerUnreachable(peer.address().clone()));
        }
        let handler = peer
            .update_handler()
            .await
            .ok_or_else(|| EngineError::PeerNotHandling(peer.address().clone()))?;

        let next = ChannelState {
            id: current.id,
            version: current.version + 1,
            allocation,
            is_final,
        };
        let update = ChannelUpdate {
            actor_idx: idx,
            state: next.clone(),
        };
        if let UpdateDecision::Reject(reason) = handler.handle_update(&current, &update).await {
            debug!(
                "Update to version {} of channel {} rejected: {}",
                next.version, self.params.id, reason
            );
            return Err(EngineError::UpdateRejected(reason));
        }

        *self.state.write().await = next.clone();
        debug!(
            "Channel {} advanced to version {} (final: {})",
            self.params.id, next.version, next.is_final
        );

        // Listeners run without the state lock so they may read the channel.
        let listeners: Vec<_> = {
            let guard = self.listeners.read().await;
            guard.iter().flatten().cloned().collect()
        };
        for listener in listeners {
            listener.on_state_update(Some(&current), &next).await;
        }
        Ok(())
    }

    async fn settle(&self, idx: PartIdx) -> EngineResult<()> {
        let state = self.snapshot().await;
        if !state.is_final {
            return Err(EngineError::NotFinal(self.params.id));
        }

        let adjudicator = self.parties[idx].adjudicator();
        adjudicator.conclude(&self.params, &state).await?;
        let payout = adjudicator.withdraw(&self.params, idx).await?;
        info!(
            "Settled channel {} for participant {}: withdrew {}",
            self.params.id, idx, payout
        );
        Ok(())
    }

    async fn watch(
        &self,
        idx: PartIdx,
        handler: Arc<dyn AdjudicatorEventHandler>,
    ) -> EngineResult<()> {
        let id = self.params.id;
        // Subscribe before checking history so a conclusion in between is not missed.
        let adjudicator = self.parties[idx].adjudicator().clone();
        let mut events = adjudicator.subscribe();
        if let Some(event) = adjudicator.concluded_event(id).await {
            handler.handle_adjudicator_event(event);
            return Ok(());
        }

        loop {
            match events.recv().await {
                Ok(event) if event.channel_id() == id => {
                    let concluded = matches!(event, AdjudicatorEvent::Concluded { .. });
                    handler.handle_adjudicator_event(event);
                    if concluded {
                        debug!("Watcher for channel {} finished", id);
                        return Ok(());
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Watcher for channel {} skipped {} events", id, skipped);
                }
                Err(RecvError::Closed) => {
                    return Err(EngineError::WatcherStopped(format!(
                        "event stream for channel {} closed",
                        id
                    )));
                }
            }
        }
    }
}

/// One participant's handle onto a [`SharedChannel`].
pub struct LocalChannel {
    shared: Arc<SharedChannel>,
    idx: PartIdx,
}

impl LocalChannel {
    pub(crate) fn new(shared: Arc<SharedChannel>, idx: PartIdx) -> Self {
        Self { shared, idx }
    }
}

#[async_trait]
impl ChannelHandle for LocalChannel {
    fn id(&self) -> ChannelId {
        self.shared.params.id
    }

    fn idx(&self) -> PartIdx {
        self.idx
    }

    fn params(&self) -> &ChannelParams {
        &self.shared.params
    }

    async fn state(&self) -> ChannelState {
        self.shared.snapshot().await
    }

    async fn update(&self, allocation: Allocation, is_final: bool) -> EngineResult<()> {
        self.shared.update(self.idx, allocation, is_final).await
    }

    async fn settle(&self) -> EngineResult<()> {
        self.shared.settle(self.idx).await
    }

    async fn close(&self) -> EngineResult<()> {
        self.shared.mark_closed(self.idx).await;
        debug!("Participant {} closed channel {}", self.idx, self.shared.params.id);
        Ok(())
    }

    async fn on_update(&self, listener: Arc<dyn StateUpdateListener>) {
        self.shared.listeners.write().await[self.idx].push(listener);
    }

    async fn watch(&self, handler: Arc<dyn AdjudicatorEventHandler>) -> EngineResult<()> {
        self.shared.watch(self.idx, handler).await
    }
}
