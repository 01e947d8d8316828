use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "paychan")]
#[command(version, about = "Payment-channel client demo over an in-process channel network", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML); skipped if missing
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scripted two-party session (default mode)
    Run {
        #[arg(short, long, help = "Deposit per side in whole units, e.g. 100 or 12.5")]
        deposit: Option<String>,

        #[arg(short, long, help = "Amount the proposer pays the responder")]
        payment: Option<String>,

        #[arg(long, default_value = "false", help = "Print a JSON summary at the end")]
        json: bool,
    },

    /// Show the identities of the demo participants
    Info,

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the merged configuration as TOML
    Show,
}
