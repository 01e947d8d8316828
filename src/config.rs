use anyhow::{anyhow, bail, Context};
use paychan_client::ClientConfig;
use paychan_types::{Amount, Asset, Network};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scripted session settings. Amounts are decimal strings in whole units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    pub proposer: String,
    pub responder: String,
    pub network: Network,
    pub initial_funds: String,
    pub deposit: String,
    pub payment: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            proposer: "alice".to_string(),
            responder: "bob".to_string(),
            network: Network::Devnet,
            initial_funds: "1000".to_string(),
            deposit: "100".to_string(),
            payment: "30".to_string(),
        }
    }
}

impl DemoConfig {
    pub fn initial_funds(&self, asset: &Asset) -> anyhow::Result<Amount> {
        asset
            .parse_amount(&self.initial_funds)
            .context("invalid demo.initial_funds")
    }

    pub fn deposit(&self, asset: &Asset) -> anyhow::Result<Amount> {
        asset.parse_amount(&self.deposit).context("invalid demo.deposit")
    }

    pub fn payment(&self, asset: &Asset) -> anyhow::Result<Amount> {
        asset.parse_amount(&self.payment).context("invalid demo.payment")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut app_config = AppConfig::default();

        // Try to load from file if exists
        if Path::new(path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::new(path, config::FileFormat::Toml))
                .build()
                .map_err(|e| anyhow!("Failed to load config file {}: {}", path, e))?;

            app_config = settings
                .try_deserialize::<AppConfig>()
                .map_err(|e| anyhow!("Invalid config file {}: {}", path, e))?;
        }

        Self::override_from_env(&mut app_config)?;
        app_config.validate()?;

        Ok(app_config)
    }

    fn override_from_env(config: &mut AppConfig) -> anyhow::Result<()> {
        if let Ok(network) = std::env::var("PAYCHAN_NETWORK") {
            config.demo.network = network
                .parse()
                .map_err(|e| anyhow!("Invalid PAYCHAN_NETWORK: {}", e))?;
        }

        if let Ok(level) = std::env::var("PAYCHAN_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(format) = std::env::var("PAYCHAN_LOG_FORMAT") {
            config.logging.format = format;
        }

        if let Ok(interval) = std::env::var("PAYCHAN_POLL_INTERVAL_MS") {
            config.client.balance_poll_interval_ms = interval
                .parse()
                .map_err(|e| anyhow!("Invalid PAYCHAN_POLL_INTERVAL_MS: {}", e))?;
        }

        if let Ok(secs) = std::env::var("PAYCHAN_CHALLENGE_SECS") {
            config.client.challenge_duration_secs = secs
                .parse()
                .map_err(|e| anyhow!("Invalid PAYCHAN_CHALLENGE_SECS: {}", e))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.client
            .validate()
            .map_err(|e| anyhow!("Invalid client config: {}", e))?;

        if self.demo.proposer.is_empty() || self.demo.responder.is_empty() {
            bail!("demo participant names cannot be empty");
        }
        if self.demo.proposer == self.demo.responder {
            bail!("demo participants must have distinct names");
        }

        let asset = Asset::ckb();
        let funds = self.demo.initial_funds(&asset)?;
        let deposit = self.demo.deposit(&asset)?;
        self.demo.payment(&asset)?;
        if deposit > funds {
            bail!(
                "deposit {} exceeds initial funds {}",
                self.demo.deposit,
                self.demo.initial_funds
            );
        }

        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => bail!("unknown log format '{}', expected json or text", other),
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}
