//! Payment client orchestrator.
//!
//! [`PaymentClient`] is a cheap handle onto an actor task that exclusively
//! owns the client's channel session. Session-changing operations travel to
//! the actor as [`Command`]s over a bounded queue and are executed one at a
//! time. Observer registration and engine state callbacks go straight to the
//! [`ObserverRegistry`], which keeps its own lock.
//!
//! ```text
//!   PaymentClient ──Command──> ClientActor (owns Option<PaymentChannel>)
//!        │                          │ attach/detach
//!        └── register/deregister ──>ObserverRegistry <── StateForwarder (engine)
//!                                   ▲
//!   BalancePoller ── BalanceStore ──┘
//! ```

use std::sync::Arc;

use paychan_protocol::{AdjudicatorEventHandler, ChainClient, ChannelHandle, ProtocolEngine};
use paychan_types::{
    Allocation, Amount, ChainAddress, ChannelId, ChannelProposal, ClientIdentity, WireAddress,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::balance_poller::BalancePoller;
use crate::balance_store::BalanceStore;
use crate::channel::PaymentChannel;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::handler::ClientHandler;
use crate::mailbox::ChannelMailbox;
use crate::metrics;
use crate::observer::{Observer, ObserverId, ObserverRegistry, StateForwarder};
use crate::watcher::{spawn_watcher, WatchReporter};

/// Requests handled by the client actor.
enum Command {
    Open {
        peer: WireAddress,
        amount: Amount,
        reply: oneshot::Sender<Result<ChannelId>>,
    },
    Install {
        channel: PaymentChannel,
        reply: oneshot::Sender<Result<ChannelId>>,
    },
    Pay {
        amount: Amount,
        reply: oneshot::Sender<Result<()>>,
    },
    Settle {
        reply: oneshot::Sender<Result<()>>,
    },
    HasOpenChannel {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running payment client.
#[derive(Clone)]
pub struct PaymentClient {
    identity: Arc<ClientIdentity>,
    engine: Arc<dyn ProtocolEngine>,
    commands: mpsc::Sender<Command>,
    registry: Arc<ObserverRegistry>,
    balance: Arc<BalanceStore>,
    mailbox: Arc<ChannelMailbox>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl PaymentClient {
    /// Build the client, start its balance poller and actor, and install it
    /// as the engine's proposal and update handler.
    pub async fn new(
        identity: ClientIdentity,
        config: ClientConfig,
        engine: Arc<dyn ProtocolEngine>,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        config.validate()?;
        if engine.address() != &identity.wire_address {
            return Err(ClientError::Construction(format!(
                "engine listens on {} but identity uses {}",
                engine.address(),
                identity.wire_address
            )));
        }

        let identity = Arc::new(identity);
        let balance = Arc::new(BalanceStore::default());
        let registry = Arc::new(ObserverRegistry::new(
            balance.clone(),
            identity.network,
            identity.asset.clone(),
        ));
        let mailbox = Arc::new(ChannelMailbox::new());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let reporter: Arc<dyn AdjudicatorEventHandler> = Arc::new(WatchReporter::new(
            identity.name.clone(),
            identity.account.address(),
        ));

        Arc::new(BalancePoller::new(
            chain,
            identity.account.address(),
            identity.asset.clone(),
            balance.clone(),
            registry.clone(),
            config.poll_interval(),
        ))
        .spawn(&tracker, shutdown.clone());

        let handler = Arc::new(ClientHandler::new(
            identity.clone(),
            mailbox.clone(),
            reporter.clone(),
            tracker.clone(),
            shutdown.clone(),
        ));
        engine.handle(handler.clone(), handler).await;

        let (commands, queue) = mpsc::channel(config.command_queue_depth);
        let actor = ClientActor {
            identity: identity.clone(),
            config,
            engine: engine.clone(),
            registry: registry.clone(),
            reporter,
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
            channel: None,
        };
        tracker.spawn(actor.run(queue));

        info!(
            "Payment client {} started at {} ({})",
            identity.name,
            identity.wire_address,
            identity.display_address()
        );

        Ok(Self {
            identity,
            engine,
            commands,
            registry,
            balance,
            mailbox,
            shutdown,
            tracker,
        })
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::ShutDown);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ClientError::ShutDown)?;
        response.await.map_err(|_| ClientError::ShutDown)
    }

    pub fn display_name(&self) -> &str {
        &self.identity.name
    }

    /// On-chain account address.
    pub fn wallet_address(&self) -> ChainAddress {
        self.identity.account.address()
    }

    /// Network-prefixed form of the account address.
    pub fn display_address(&self) -> String {
        self.identity.display_address()
    }

    pub fn wire_address(&self) -> &WireAddress {
        &self.identity.wire_address
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Last balance observed by the poller.
    pub async fn balance(&self) -> Amount {
        self.balance.get().await
    }

    /// Add an observer. It immediately receives the current channel state
    /// (if a channel is open) and the current balance.
    pub async fn register(&self, observer: Arc<dyn Observer>) {
        self.registry.register(observer).await;
    }

    /// Remove an observer. Unknown ids are ignored.
    pub async fn deregister(&self, id: ObserverId) {
        self.registry.deregister(id).await;
    }

    /// Propose a channel to `peer` with `amount` deposited on each side and
    /// install it once the peer accepts.
    pub async fn open_channel(&self, peer: WireAddress, amount: Amount) -> Result<ChannelId> {
        self.request(|reply| Command::Open {
            peer,
            amount,
            reply,
        })
        .await?
    }

    /// Pay `amount` to the peer over the open channel.
    pub async fn send_payment_to_peer(&self, amount: Amount) -> Result<()> {
        self.request(|reply| Command::Pay { amount, reply }).await?
    }

    /// Finalize and settle the open channel, then forget it.
    pub async fn settle_channel(&self) -> Result<()> {
        self.request(|reply| Command::Settle { reply }).await?
    }

    /// Wait for a peer-initiated channel and install it.
    pub async fn accept_pending_channel(&self) -> Result<ChannelId> {
        let channel = self.mailbox.next(&self.shutdown).await?;
        self.request(|reply| Command::Install { channel, reply })
            .await?
    }

    /// Whether a channel is installed. Always false once shut down.
    pub async fn has_open_channel(&self) -> bool {
        self.request(|reply| Command::HasOpenChannel { reply })
            .await
            .unwrap_or(false)
    }

    /// Close the engine and stop the actor, the poller and all watchers.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down payment client {}", self.identity.name);
        self.shutdown.cancel();
        if let Err(e) = self.engine.close().await {
            warn!("Closing engine for {} failed: {}", self.identity.name, e);
        }
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Payment client {} stopped", self.identity.name);
    }
}

/// Owns the channel session. Runs until shutdown or until every handle is gone.
struct ClientActor {
    identity: Arc<ClientIdentity>,
    config: ClientConfig,
    engine: Arc<dyn ProtocolEngine>,
    registry: Arc<ObserverRegistry>,
    reporter: Arc<dyn AdjudicatorEventHandler>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    channel: Option<Arc<PaymentChannel>>,
}

impl ClientActor {
    async fn run(mut self, mut queue: mpsc::Receiver<Command>) {
        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = queue.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            // Replies fail only if the caller gave up waiting.
            match command {
                Command::Open {
                    peer,
                    amount,
                    reply,
                } => {
                    let _ = reply.send(self.open(peer, amount).await);
                }
                Command::Install { channel, reply } => {
                    let _ = reply.send(self.install_inbound(channel).await);
                }
                Command::Pay { amount, reply } => {
                    let _ = reply.send(self.pay(amount).await);
                }
                Command::Settle { reply } => {
                    let _ = reply.send(self.settle().await);
                }
                Command::HasOpenChannel { reply } => {
                    let _ = reply.send(self.channel.is_some());
                }
            }
        }
        debug!("Client actor for {} stopped", self.identity.name);
    }

    fn active(&self) -> Result<&Arc<PaymentChannel>> {
        self.channel.as_ref().ok_or(ClientError::NoActiveChannel)
    }

    async fn open(&mut self, peer: WireAddress, amount: Amount) -> Result<ChannelId> {
        if let Some(channel) = &self.channel {
            return Err(ClientError::ChannelAlreadyOpen(channel.id()));
        }

        let proposal = ChannelProposal::ledger(
            self.config.challenge_duration_secs,
            self.identity.account.address(),
            Allocation::two_party(self.identity.asset.clone(), amount, amount),
            vec![self.identity.wire_address.clone(), peer.clone()],
        )
        .map_err(|e| ClientError::InvalidProposal(e.to_string()))?;
        debug!("{} proposing channel to {}", self.identity.name, peer);

        let handle = match self.engine.propose_channel(proposal).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{} channel proposal to {} failed: {}", self.identity.name, peer, e);
                return Err(ClientError::from_proposal(e));
            }
        };

        spawn_watcher(
            &self.tracker,
            self.shutdown.clone(),
            handle.clone(),
            self.reporter.clone(),
        );
        Ok(self.install(handle, "outbound").await)
    }

    /// Adopt a peer-initiated channel. An installed channel is replaced: it
    /// stays open on the engine so its peer can still settle it, but no
    /// longer feeds our observers.
    async fn install_inbound(&mut self, channel: PaymentChannel) -> Result<ChannelId> {
        if let Some(previous) = self.channel.take() {
            self.registry.detach().await;
            warn!(
                "{} replacing channel {} with inbound channel {}",
                self.identity.name,
                previous.id(),
                channel.id()
            );
        }
        let handle = channel.handle().clone();
        Ok(self.install(handle, "inbound").await)
    }

    /// Make `handle` the active channel and announce its initial state.
    async fn install(&mut self, handle: Arc<dyn ChannelHandle>, direction: &str) -> ChannelId {
        let channel = Arc::new(PaymentChannel::new(handle.clone(), self.identity.asset.clone()));
        let id = channel.id();

        self.registry.attach(channel.clone()).await;
        handle
            .on_update(Arc::new(StateForwarder::new(
                self.registry.clone(),
                channel.params().clone(),
            )))
            .await;

        let state = channel.state().await;
        self.registry
            .broadcast_channel_state(channel.params(), &state)
            .await;
        self.channel = Some(channel);

        metrics::record_channel_opened(direction);
        info!("{} installed {} channel {}", self.identity.name, direction, id);
        id
    }

    async fn pay(&self, amount: Amount) -> Result<()> {
        self.active()?.send_payment(amount).await
    }

    async fn settle(&mut self) -> Result<()> {
        self.active()?.settle().await?;
        self.registry.detach().await;
        if let Some(channel) = self.channel.take() {
            info!("{} released channel {}", self.identity.name, channel.id());
        }
        Ok(())
    }
}
