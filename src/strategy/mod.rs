pub mod arbitrage;
pub mod factory;
pub mod ma_crossover;
pub mod manager;
pub mod traits;
pub mod volatility;

pub use arbitrage::{ArbitrageStrategy, Opportunity};
pub use factory::StrategyFactory;
pub use ma_crossover::{CrossoverState, MaCrossoverStrategy};
pub use manager::StrategyManager;
pub use traits::{OpenPositions, Strategy, StrategyStatus};
pub use volatility::{returns_volatility, sample_std_dev, simple_returns};
