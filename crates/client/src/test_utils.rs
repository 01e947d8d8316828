//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use paychan_protocol::{
    AdjudicatorEventHandler, ChannelHandle, EngineError, EngineResult, StateUpdateListener,
};
use paychan_types::{
    Allocation, Amount, Asset, ChainAddress, ChannelId, ChannelParams, ChannelState, PartIdx,
    Participant, WireAddress,
};
use tokio::sync::Mutex;

/// Handle that applies updates locally, optionally rejecting them.
pub(crate) struct FakeHandle {
    pub(crate) params: ChannelParams,
    pub(crate) state: Mutex<ChannelState>,
    pub(crate) reject: bool,
    pub(crate) settles: AtomicUsize,
    pub(crate) closes: AtomicUsize,
}

impl FakeHandle {
    pub(crate) fn new(reject: bool) -> Self {
        let id = ChannelId::new_random();
        let participants = ["alice", "bob"]
            .iter()
            .map(|n| Participant {
                wire: WireAddress::from(*n),
                chain: ChainAddress::from_seed(n),
            })
            .collect();
        Self {
            params: ChannelParams {
                id,
                participants,
                challenge_duration_secs: 10,
            },
            state: Mutex::new(ChannelState::initial(
                id,
                Allocation::two_party(Asset::ckb(), Amount(100), Amount(100)),
            )),
            reject,
            settles: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChannelHandle for FakeHandle {
    fn id(&self) -> ChannelId {
        self.params.id
    }

    fn idx(&self) -> PartIdx {
        0
    }

    fn params(&self) -> &ChannelParams {
        &self.params
    }

    async fn state(&self) -> ChannelState {
        self.state.lock().await.clone()
    }

    async fn update(&self, allocation: Allocation, is_final: bool) -> EngineResult<()> {
        if self.reject {
            return Err(EngineError::UpdateRejected("no".to_string()));
        }
        let mut state = self.state.lock().await;
        state.version += 1;
        state.allocation = allocation;
        state.is_final = is_final;
        Ok(())
    }

    async fn settle(&self) -> EngineResult<()> {
        self.settles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_update(&self, _listener: Arc<dyn StateUpdateListener>) {}

    async fn watch(&self, _handler: Arc<dyn AdjudicatorEventHandler>) -> EngineResult<()> {
        Ok(())
    }
}
