//! Control loop and its background tasks

mod tasks;
mod trading_bot;

pub use tasks::{poll_market_data, run_monitoring};
pub use trading_bot::{CycleReport, TradingBot};
