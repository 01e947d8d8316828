//! Observer registry and fan-out of state and balance notifications.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use paychan_protocol::StateUpdateListener;
use paychan_types::{Asset, ChannelParams, ChannelState, Network};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::balance_store::BalanceStore;
use crate::channel::PaymentChannel;
use crate::format::{render_balance, render_state};
use crate::metrics;

/// Stable identity of an observer, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    pub fn new_random() -> Self {
        ObserverId(Uuid::new_v4())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives rendered channel states and balances.
///
/// Callbacks are invoked synchronously while the registry lock is held, so
/// they must not call back into the registry.
pub trait Observer: Send + Sync {
    fn id(&self) -> ObserverId;

    fn update_state(&self, state: &str);

    fn update_balance(&self, balance: &str);
}

struct RegistryInner {
    observers: Vec<Arc<dyn Observer>>,
    /// Read-only view of the installed channel, for snapshots on registration.
    channel: Option<Arc<PaymentChannel>>,
}

/// Ordered set of observers.
pub struct ObserverRegistry {
    inner: Mutex<RegistryInner>,
    balance: Arc<BalanceStore>,
    network: Network,
    asset: Asset,
}

impl ObserverRegistry {
    pub fn new(balance: Arc<BalanceStore>, network: Network, asset: Asset) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                observers: Vec::new(),
                channel: None,
            }),
            balance,
            network,
            asset,
        }
    }

    /// Add an observer and bring it up to date: the current channel state if
    /// a channel is installed, then always the current balance.
    pub async fn register(&self, observer: Arc<dyn Observer>) {
        let mut inner = self.inner.lock().await;
        inner.observers.push(observer.clone());
        metrics::OBSERVERS_REGISTERED.inc();

        // Both snapshots are taken with the registry lock held. Any later
        // state or balance broadcast needs this lock too, so it reaches the
        // new observer after its snapshot and never before. Engines call
        // state listeners without holding their own state lock, and the
        // balance lock is never held while waiting on the registry, so the
        // registry then balance order cannot cycle.
        if let Some(channel) = &inner.channel {
            let state = channel.state().await;
            observer.update_state(&render_state(channel.params(), &state, self.network));
        }
        let balance = self.balance.get().await;
        observer.update_balance(&render_balance(balance, &self.asset));
        debug!("Registered observer {}", observer.id());
    }

    /// Remove the observer with `id`. Returns whether it was registered.
    pub async fn deregister(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.observers.len();
        inner.observers.retain(|o| o.id() != id);
        let removed = before - inner.observers.len();
        if removed > 0 {
            metrics::OBSERVERS_REGISTERED.sub(removed as i64);
            debug!("Deregistered observer {}", id);
        }
        removed > 0
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.observers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Deliver a rendered state to every observer in registration order.
    pub async fn broadcast_state(&self, rendered: &str) {
        let inner = self.inner.lock().await;
        for observer in &inner.observers {
            observer.update_state(rendered);
        }
    }

    /// Deliver a rendered balance to every observer in registration order.
    pub async fn broadcast_balance(&self, rendered: &str) {
        let inner = self.inner.lock().await;
        for observer in &inner.observers {
            observer.update_balance(rendered);
        }
    }

    pub async fn broadcast_channel_state(&self, params: &ChannelParams, state: &ChannelState) {
        self.broadcast_state(&render_state(params, state, self.network))
            .await;
    }

    /// Broadcast `state` only while its channel is the attached one.
    pub(crate) async fn broadcast_attached_state(&self, params: &ChannelParams, state: &ChannelState) {
        let inner = self.inner.lock().await;
        if inner.channel.as_ref().map(|c| c.id()) != Some(params.id) {
            debug!("Ignoring state of detached channel {}", params.id);
            return;
        }
        let rendered = render_state(params, state, self.network);
        for observer in &inner.observers {
            observer.update_state(&rendered);
        }
    }

    pub(crate) async fn attach(&self, channel: Arc<PaymentChannel>) {
        self.inner.lock().await.channel = Some(channel);
    }

    pub(crate) async fn detach(&self) {
        self.inner.lock().await.channel = None;
    }
}

/// Engine listener that forwards every transition of one channel to the
/// registry while that channel is attached.
pub(crate) struct StateForwarder {
    registry: Arc<ObserverRegistry>,
    params: ChannelParams,
}

impl StateForwarder {
    pub(crate) fn new(registry: Arc<ObserverRegistry>, params: ChannelParams) -> Self {
        Self { registry, params }
    }
}

#[async_trait]
impl StateUpdateListener for StateForwarder {
    async fn on_state_update(&self, _from: Option<&ChannelState>, to: &ChannelState) {
        self.registry
            .broadcast_attached_state(&self.params, to)
            .await;
    }
}
