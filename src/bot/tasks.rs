//! Background tasks spawned by the trading bot

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::coordination::GracefulShutdown;
use crate::domain::Ticker;
use crate::exchange::MarketDataFeed;
use crate::monitoring::MonitoringSystem;
use crate::risk::RiskManager;

/// Poll tickers for one exchange and push them into the tick channel until
/// shutdown or until the receiver is gone.
pub async fn poll_market_data(
    feed: Arc<dyn MarketDataFeed>,
    exchange: String,
    trading_pairs: Vec<String>,
    interval: Duration,
    tick_tx: mpsc::Sender<Ticker>,
    shutdown: Arc<GracefulShutdown>,
) {
    let mut poll_tick = tokio::time::interval(interval);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("[{}] market data poller started ({} pairs)", exchange, trading_pairs.len());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = poll_tick.tick() => {}
        }

        for pair in &trading_pairs {
            let ticker = match feed.fetch_ticker(&exchange, pair).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!("[{}] ticker {} unavailable: {}", exchange, pair, e);
                    continue;
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("[{}] market data poller stopped", exchange);
                    return;
                }
                sent = tick_tx.send(ticker) => {
                    if sent.is_err() {
                        debug!("[{}] tick channel closed", exchange);
                        return;
                    }
                }
            }
        }
    }

    info!("[{}] market data poller stopped", exchange);
}

/// Periodic risk alerts and performance summary
pub async fn run_monitoring(
    risk: Arc<Mutex<RiskManager>>,
    monitoring: Arc<Mutex<MonitoringSystem>>,
    interval: Duration,
    shutdown: Arc<GracefulShutdown>,
) {
    let mut monitor_tick = tokio::time::interval(interval);
    monitor_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = monitor_tick.tick() => {}
        }

        let snapshot = risk.lock().await.snapshot();
        let monitoring = monitoring.lock().await;
        monitoring.monitor_risk(&snapshot).await;
        monitoring.log_summary();
    }

    info!("Monitoring task stopped");
}
