use clap::Parser;
use cryptrade::cli::{Cli, Commands};
use cryptrade::config::AppConfig;
use cryptrade::coordination::ShutdownSignal;
use cryptrade::error::{Result, TradeError};
use cryptrade::exchange::{build_exchange_clients, build_market_data_feed};
use cryptrade::TradingBot;
use tracing::{error, info};

mod main_runtime;

use main_runtime::{init_logging, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => {
            let config = load_config(&cli.config_dir)?;
            println!(
                "Configuration OK: mode {:?}, {} exchange(s), {} strategy(ies)",
                config.trading.mode,
                config.exchanges.len(),
                config.strategies.len()
            );
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            let config = load_config(&cli.config_dir)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Run { once }) => run_bot(&cli.config_dir, *once).await,
        None => run_bot(&cli.config_dir, false).await,
    }
}

fn load_config(config_dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    config.validate().map_err(TradeError::InvalidConfig)?;
    Ok(config)
}

async fn run_bot(config_dir: &str, once: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let _log_guard = init_logging(&config.logging);
    info!("Starting cryptrade in {:?} mode", config.trading.mode);

    let feed = build_market_data_feed(&config)?;
    let exchanges = build_exchange_clients(&config, feed.clone())?;
    let mut bot = TradingBot::new(config, feed, exchanges)?;

    if once {
        let report = bot.run_once().await;
        info!("Single cycle finished: {:?}", report);
        return Ok(());
    }

    let shutdown = bot.shutdown_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        shutdown.request_shutdown(ShutdownSignal::Interrupt);
    });

    if let Err(e) = bot.run().await {
        error!("Trading bot stopped with error: {}", e);
        return Err(e);
    }
    Ok(())
}
