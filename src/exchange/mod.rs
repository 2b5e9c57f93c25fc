pub mod factory;
mod traits;

pub use factory::{build_exchange_clients, build_market_data_feed, ExchangeRegistry};
pub use traits::{ExchangeClient, MarketDataFeed};
