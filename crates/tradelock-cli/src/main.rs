//! tradelock - trade confirmation session from the terminal.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tradelock_core::{Party, TradeId};

/// Mount a trade confirmation session and drive it from stdin.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRADELOCK_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Trade to mount
    #[arg(short, long)]
    trade_id: TradeId,

    /// Side the local user acts for (owner or requester)
    #[arg(short, long)]
    party: Option<Party>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tradelock_telemetry::init_logging()?;

    info!("Starting tradelock v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TRADELOCK_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRADELOCK_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = tradelock_cli::AppConfig::from_file(&config_path)?;
    let party = config.resolve_party(args.party)?;
    info!(api_url = %config.gateway.api_url, %party, "Configuration loaded");

    let app = tradelock_cli::Application::new(config, args.trade_id, party)?;
    let exit = app.run().await?;

    info!(reason = ?exit.reason, "Exiting");
    Ok(())
}
