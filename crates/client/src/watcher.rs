//! Dispute watcher launcher.

use std::sync::Arc;

use paychan_protocol::{AdjudicatorEventHandler, ChannelHandle};
use paychan_types::{AdjudicatorEvent, ChainAddress};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::metrics;

/// Logs and counts adjudicator events delivered by a watcher.
pub struct WatchReporter {
    name: String,
    account: ChainAddress,
}

impl WatchReporter {
    pub fn new(name: impl Into<String>, account: ChainAddress) -> Self {
        Self {
            name: name.into(),
            account,
        }
    }
}

impl AdjudicatorEventHandler for WatchReporter {
    fn handle_adjudicator_event(&self, event: AdjudicatorEvent) {
        metrics::record_adjudicator_event(event.kind());
        info!(
            "{} ({}): adjudicator event {} for channel {} at version {}",
            self.name,
            self.account,
            event.kind(),
            event.channel_id(),
            event.version()
        );
    }
}

/// Watch `channel` in the background until it concludes, fails or `shutdown`
/// fires. Failures are logged and never propagated.
pub fn spawn_watcher(
    tracker: &TaskTracker,
    shutdown: CancellationToken,
    channel: Arc<dyn ChannelHandle>,
    reporter: Arc<dyn AdjudicatorEventHandler>,
) {
    let id = channel.id();
    debug!("Starting watcher for channel {}", id);

    tracker.spawn(async move {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => "cancelled",
            result = channel.watch(reporter) => match result {
                Ok(()) => "concluded",
                Err(e) => {
                    error!("Watcher for channel {} returned with error: {}", id, e);
                    "error"
                }
            },
        };
        metrics::record_watcher_exit(outcome);
        debug!("Watcher for channel {} exited: {}", id, outcome);
    });
}
