use tracing::info;

use crate::config::StrategyConfig;
use crate::error::Result;

use super::arbitrage::ArbitrageStrategy;
use super::ma_crossover::MaCrossoverStrategy;
use super::manager::StrategyManager;
use super::traits::Strategy;

/// Builds strategy instances from their tagged configuration
pub struct StrategyFactory;

impl StrategyFactory {
    pub fn create(config: &StrategyConfig) -> Box<dyn Strategy> {
        match config {
            StrategyConfig::MaCrossover(c) => Box::new(MaCrossoverStrategy::new(c.clone())),
            StrategyConfig::Arbitrage(c) => Box::new(ArbitrageStrategy::new(c.clone())),
        }
    }

    /// Manager holding every enabled strategy
    pub fn build_manager(configs: &[StrategyConfig]) -> Result<StrategyManager> {
        let mut manager = StrategyManager::new();
        for config in configs.iter().filter(|c| c.enabled()) {
            manager.add_strategy(Self::create(config))?;
        }
        info!("{} strategy instance(s) loaded", manager.len());
        Ok(manager)
    }
}
