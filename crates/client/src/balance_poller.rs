//! Balance Poller
//!
//! Periodically queries the chain for the account's live balance and pushes
//! every change into the balance store and out to observers. Failed or
//! timed-out queries are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use paychan_protocol::ChainClient;
use paychan_types::{Amount, Asset, ChainAddress};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::balance_store::BalanceStore;
use crate::format::render_balance;
use crate::metrics;
use crate::observer::ObserverRegistry;

/// Background balance poller for one account
pub struct BalancePoller {
    /// Chain query client
    chain: Arc<dyn ChainClient>,
    /// Account being watched
    account: ChainAddress,
    asset: Asset,
    store: Arc<BalanceStore>,
    registry: Arc<ObserverRegistry>,
    /// Poll interval, also the per-query timeout
    interval: Duration,
}

impl BalancePoller {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        account: ChainAddress,
        asset: Asset,
        store: Arc<BalanceStore>,
        registry: Arc<ObserverRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            chain,
            account,
            asset,
            store,
            registry,
            interval,
        }
    }

    /// Query once. Returns the new balance if it differed from the stored one.
    pub async fn poll_once(&self) -> Option<Amount> {
        let balance = match time::timeout(self.interval, self.chain.get_balance(&self.account)).await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                metrics::BALANCE_POLL_FAILURES.inc();
                warn!("Balance query for {} failed: {}", self.account, e);
                return None;
            }
            Err(_) => {
                metrics::BALANCE_POLL_FAILURES.inc();
                warn!(
                    "Balance query for {} timed out after {:?}",
                    self.account, self.interval
                );
                return None;
            }
        };

        if self.store.get().await == balance {
            return None;
        }
        self.store.set(balance).await;
        metrics::BALANCE_UPDATES.inc();
        debug!("Balance of {} changed to {}", self.account, balance);

        self.registry
            .broadcast_balance(&render_balance(balance, &self.asset))
            .await;
        Some(balance)
    }

    /// Poll until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        info!(
            "Starting balance poller for {} (interval: {:?})",
            self.account, self.interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }

        debug!("Balance poller for {} stopped", self.account);
    }

    /// Spawn the poller as a tracked background task.
    pub fn spawn(self: Arc<Self>, tracker: &TaskTracker, shutdown: CancellationToken) {
        tracker.spawn(self.run(shutdown));
    }
}
