use crate::config::AppConfig;
use paychan_client::{render_balance, Observer, ObserverId, PaymentClient};
use paychan_protocol::{LocalBus, LocalEngine, LocalLedger};
use paychan_types::{Amount, Asset, ClientIdentity};
use std::sync::Arc;
use tracing::info;

/// Prints every notification a client emits.
pub struct ConsoleObserver {
    id: ObserverId,
    name: String,
}

impl ConsoleObserver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ObserverId::new_random(),
            name: name.into(),
        }
    }
}

impl Observer for ConsoleObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn update_state(&self, state: &str) {
        println!("\n[{}] channel state", self.name);
        for line in state.lines() {
            println!("  {}", line);
        }
    }

    fn update_balance(&self, balance: &str) {
        println!("[{}] on-chain balance: {}", self.name, balance);
    }
}

/// Two clients sharing one in-process chain and wire bus.
pub struct DemoSession {
    config: AppConfig,
    asset: Asset,
    ledger: Arc<LocalLedger>,
    proposer: PaymentClient,
    responder: PaymentClient,
}

impl DemoSession {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let asset = Asset::ckb();
        let ledger = Arc::new(LocalLedger::new());
        let bus = LocalBus::new();
        let funds = config.demo.initial_funds(&asset)?;

        info!("Initializing demo session on {}", config.demo.network);
        let proposer = Self::spawn_client(&config, &config.demo.proposer, &bus, &ledger, funds).await?;
        let responder =
            Self::spawn_client(&config, &config.demo.responder, &bus, &ledger, funds).await?;

        Ok(Self {
            config,
            asset,
            ledger,
            proposer,
            responder,
        })
    }

    async fn spawn_client(
        config: &AppConfig,
        name: &str,
        bus: &LocalBus,
        ledger: &Arc<LocalLedger>,
        funds: Amount,
    ) -> anyhow::Result<PaymentClient> {
        let identity = ClientIdentity::local(name, config.demo.network, Asset::ckb());
        ledger.mint(identity.account.address(), funds).await?;

        let engine = LocalEngine::new(
            identity.wire_address.clone(),
            bus.clone(),
            ledger.clone(),
            ledger.clone(),
        )
        .await?;
        let client = PaymentClient::new(
            identity,
            config.client.clone(),
            Arc::new(engine),
            ledger.clone(),
        )
        .await?;
        Ok(client)
    }

    pub fn participants(&self) -> [&PaymentClient; 2] {
        [&self.proposer, &self.responder]
    }

    /// Open, pay, settle on both sides, then report final on-chain balances.
    pub async fn run(&self, deposit: Amount, payment: Amount, json: bool) -> anyhow::Result<()> {
        for client in self.participants() {
            client
                .register(Arc::new(ConsoleObserver::new(client.display_name())))
                .await;
        }

        info!(
            "{} opens a channel to {} with {} each",
            self.proposer.display_name(),
            self.responder.display_name(),
            deposit
        );
        let (opened, accepted) = tokio::join!(
            self.proposer
                .open_channel(self.responder.wire_address().clone(), deposit),
            self.responder.accept_pending_channel(),
        );
        let channel_id = opened?;
        accepted?;
        info!("Channel {} is open on both sides", channel_id);

        self.proposer.send_payment_to_peer(payment).await?;
        info!(
            "{} paid {} {}",
            self.proposer.display_name(),
            self.asset.format_amount(payment, 2),
            self.asset
        );

        self.proposer.settle_channel().await?;
        self.responder.settle_channel().await?;
        info!("Channel {} settled by both parties", channel_id);

        // Give the pollers a chance to pick up the payouts.
        tokio::time::sleep(self.config.client.poll_interval() * 2).await;

        println!("\nFinal on-chain balances");
        println!("─────────────────────────────────────");
        for client in self.participants() {
            let onchain = self.ledger.balance_of(&client.wallet_address()).await;
            println!(
                "  {:<10} {}  {}",
                client.display_name(),
                client.display_address(),
                render_balance(onchain, &self.asset)
            );
        }

        if json {
            self.print_json_summary(channel_id.to_string()).await;
        }
        Ok(())
    }

    async fn print_json_summary(&self, channel_id: String) {
        let mut balances = serde_json::Map::new();
        for client in self.participants() {
            let onchain = self.ledger.balance_of(&client.wallet_address()).await;
            balances.insert(
                client.display_name().to_string(),
                serde_json::Value::String(render_balance(onchain, &self.asset)),
            );
        }
        let summary = serde_json::json!({
            "channel_id": channel_id,
            "network": self.config.demo.network.to_string(),
            "balances": balances,
        });
        println!("{}", summary);
    }

    pub async fn shutdown(&self) {
        futures::future::join_all(self.participants().map(|client| client.shutdown())).await;
    }
}
