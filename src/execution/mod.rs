//! Order execution and the position ledger

mod executor;
mod ledger;

pub use executor::{Fill, OrderExecutor};
pub use ledger::{FillOutcome, PositionLedger};
