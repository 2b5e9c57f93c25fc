//! Risk management: sizing, stops, exposure, drawdown and loss limits

mod circuit_breaker;
mod drawdown;
mod exposure;
mod manager;
mod sizing;
mod stop_loss;

pub use circuit_breaker::CircuitBreaker;
pub use drawdown::{DrawdownMonitor, DrawdownPeriod};
pub use exposure::{ExposureEntry, ExposureMonitor};
pub use manager::{RiskDecision, RiskManager, RiskSnapshot, RiskState};
pub use sizing::PositionSizer;
pub use stop_loss::StopLossManager;
