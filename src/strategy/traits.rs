//! Core strategy traits and types
//!
//! Defines the common interface that all signal-generating strategies implement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Direction, Order, PairKey, Signal, Ticker, Trade};

/// Direction of each open position, as seen by strategies
pub type OpenPositions = HashMap<PairKey, Direction>;

/// Lifecycle status of a strategy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyStatus {
    Active,
    Paused,
    Stopped,
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyStatus::Active => write!(f, "ACTIVE"),
            StrategyStatus::Paused => write!(f, "PAUSED"),
            StrategyStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

// ============================================================================
// Strategy Trait
// ============================================================================

/// Core trait that all trading strategies must implement
pub trait Strategy: Send + Sync {
    /// Unique strategy identifier
    fn id(&self) -> &str;

    /// Human-readable strategy name
    fn name(&self) -> &str;

    /// Venues this strategy listens to (empty = all)
    fn target_exchanges(&self) -> &[String];

    /// Pairs this strategy listens to (empty = all)
    fn target_pairs(&self) -> &[String];

    fn status(&self) -> StrategyStatus;

    fn set_status(&mut self, status: StrategyStatus);

    /// Fold a new price into the indicator state and return any signals
    fn on_market_data(
        &mut self,
        ticker: &Ticker,
        open_positions: &OpenPositions,
        now: DateTime<Utc>,
    ) -> Vec<Signal>;

    /// Called when one of this strategy's orders changes status
    fn on_order_update(&mut self, _order: &Order) {}

    /// Called for every fill attributed to this strategy
    fn on_trade(&mut self, _trade: &Trade) {}

    /// Whether `ticker` is within this strategy's targets
    fn accepts(&self, ticker: &Ticker) -> bool {
        let exchanges = self.target_exchanges();
        let pairs = self.target_pairs();
        (exchanges.is_empty() || exchanges.iter().any(|e| e == &ticker.exchange))
            && (pairs.is_empty() || pairs.iter().any(|p| p == &ticker.trading_pair))
    }
}
