pub mod binance_rest;
pub mod memory_feed;
pub mod paper;

pub use binance_rest::BinanceMarketData;
pub use memory_feed::InMemoryFeed;
pub use paper::PaperExchange;
