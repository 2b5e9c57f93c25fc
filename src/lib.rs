pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod monitoring;
pub mod risk;
pub mod strategy;

pub use bot::{CycleReport, TradingBot};
pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal};
pub use domain::{
    Direction, Order, OrderSide, OrderStatus, OrderType, PairKey, Position, Signal, SignalType,
    Ticker, Trade,
};
pub use error::{Result, TradeError};
pub use exchange::{ExchangeClient, ExchangeRegistry, MarketDataFeed};
pub use execution::{OrderExecutor, PositionLedger};
pub use monitoring::{Alert, AlertLevel, AlertManager, MonitoringSystem};
pub use risk::{RiskDecision, RiskManager, RiskSnapshot};
pub use strategy::{Strategy, StrategyManager};
