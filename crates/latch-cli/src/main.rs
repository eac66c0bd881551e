mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "latch",
    about = "Door access controller: lock relay, caller-id modem and RFID terminal",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file
    #[arg(long, short, global = true, env = "LATCH_CONFIG", default_value = "latch.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set (e.g. "info,audit=info")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller on the configured hardware
    Run,

    /// Run the controller against simulated hardware driven from stdin
    Simulate,

    /// Pulse the lock once and log the door switch
    TestLock {
        /// Unlock duration in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
    },

    /// Open the modem and log its events until interrupted
    TestModem,

    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run => cmd::run::run(&cmd::load_settings(&cli.config)?).await,
        Commands::Simulate => cmd::simulate::run(&cmd::load_settings_or_default(&cli.config)?).await,
        Commands::TestLock { seconds } => {
            cmd::test_lock::run(&cmd::load_settings(&cli.config)?, seconds).await
        }
        Commands::TestModem => cmd::test_modem::run(&cmd::load_settings(&cli.config)?).await,
        Commands::CheckConfig => cmd::check_config::run(&cli.config),
    }
}
