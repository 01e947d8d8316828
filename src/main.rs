mod app;
mod cli;
mod config;

use app::DemoSession;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use config::AppConfig;
use paychan_types::{Asset, ClientIdentity};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    init_tracing(&config.logging.level, &config.logging.format);
    info!("Configuration loaded from {}", cli.config);

    match cli.command {
        Some(Commands::Run {
            deposit,
            payment,
            json,
        }) => run_demo(config, deposit, payment, json).await?,
        None => run_demo(config, None, None, false).await?,
        Some(Commands::Info) => show_info(&config),
        Some(Commands::Config {
            action: ConfigAction::Show,
        }) => println!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn run_demo(
    mut config: AppConfig,
    deposit: Option<String>,
    payment: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(deposit) = deposit {
        config.demo.deposit = deposit;
    }
    if let Some(payment) = payment {
        config.demo.payment = payment;
    }

    let asset = Asset::ckb();
    let deposit = config.demo.deposit(&asset)?;
    let payment = config.demo.payment(&asset)?;

    info!("===================================");
    info!("Payment Channel Demo Starting");
    info!("===================================");

    let session = DemoSession::new(config).await?;
    let result = session.run(deposit, payment, json).await;
    session.shutdown().await;
    result
}

fn show_info(config: &AppConfig) {
    println!("\nDemo Participants");
    println!("─────────────────────────────────────");
    for name in [&config.demo.proposer, &config.demo.responder] {
        let identity = ClientIdentity::local(name.as_str(), config.demo.network, Asset::ckb());
        println!("  Name:        {}", identity.name);
        println!("  Address:     {}", identity.display_address());
        println!("  Wire:        {}", identity.wire_address);
        println!();
    }
    println!("  Network:     {}", config.demo.network);
    println!(
        "  Challenge:   {}s",
        config.client.challenge_duration_secs
    );
}

fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
