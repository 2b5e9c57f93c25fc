//! Strategy Manager
//!
//! Owns the strategy instances, routes ticks to the ones that target them and
//! forwards order/fill updates back to the originating strategy.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{Order, Signal, Ticker, Trade};
use crate::error::{Result, TradeError};

use super::traits::{OpenPositions, Strategy, StrategyStatus};

#[derive(Default)]
pub struct StrategyManager {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<()> {
        if self.strategies.iter().any(|s| s.id() == strategy.id()) {
            return Err(TradeError::Validation(format!(
                "strategy '{}' already registered",
                strategy.id()
            )));
        }
        info!("Registered strategy {} ({})", strategy.id(), strategy.name());
        self.strategies.push(strategy);
        Ok(())
    }

    pub fn remove_strategy(&mut self, id: &str) -> Option<Box<dyn Strategy>> {
        let index = self.strategies.iter().position(|s| s.id() == id)?;
        info!("Removed strategy {}", id);
        Some(self.strategies.remove(index))
    }

    pub fn set_status(&mut self, id: &str, status: StrategyStatus) -> bool {
        match self.strategies.iter_mut().find(|s| s.id() == id) {
            Some(strategy) => {
                info!("Strategy {} -> {}", id, status);
                strategy.set_status(status);
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: &str) -> Option<StrategyStatus> {
        self.strategies.iter().find(|s| s.id() == id).map(|s| s.status())
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Feed one tick to every active strategy that targets it, in registration order
    pub fn process_market_data(
        &mut self,
        ticker: &Ticker,
        open_positions: &OpenPositions,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let mut signals = Vec::new();
        for strategy in self
            .strategies
            .iter_mut()
            .filter(|s| s.status() == StrategyStatus::Active)
        {
            if !strategy.accepts(ticker) {
                continue;
            }
            let emitted = strategy.on_market_data(ticker, open_positions, now);
            if !emitted.is_empty() {
                debug!("{} emitted {} signal(s)", strategy.id(), emitted.len());
            }
            signals.extend(emitted);
        }
        signals
    }

    pub fn on_order_update(&mut self, order: &Order) {
        if let Some(strategy) = self.owner_of(order.strategy_id.as_deref()) {
            strategy.on_order_update(order);
        }
    }

    pub fn on_trade(&mut self, trade: &Trade) {
        if let Some(strategy) = self.owner_of(trade.strategy_id.as_deref()) {
            strategy.on_trade(trade);
        }
    }

    fn owner_of(&mut self, strategy_id: Option<&str>) -> Option<&mut Box<dyn Strategy>> {
        let id = strategy_id?;
        self.strategies.iter_mut().find(|s| s.id() == id)
    }
}
