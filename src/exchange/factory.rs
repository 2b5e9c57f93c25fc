use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::adapters::{BinanceMarketData, InMemoryFeed, PaperExchange};
use crate::config::{AppConfig, MarketDataSource, TradingMode};
use crate::error::{Result, TradeError};

use super::{ExchangeClient, MarketDataFeed};

/// Exchange clients keyed by configured venue name
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    clients: BTreeMap<String, Arc<dyn ExchangeClient>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, client: Arc<dyn ExchangeClient>) {
        self.clients.insert(name.to_string(), client);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn ExchangeClient>> {
        self.clients
            .get(name)
            .ok_or_else(|| TradeError::UnknownExchange(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn ExchangeClient>)> {
        self.clients.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Create one exchange client per configured venue.
pub fn build_exchange_clients(
    app_config: &AppConfig,
    feed: Arc<dyn MarketDataFeed>,
) -> Result<ExchangeRegistry> {
    match app_config.trading.mode {
        TradingMode::Paper => {
            let mut registry = ExchangeRegistry::new();
            for exchange in &app_config.exchanges {
                info!(
                    "Paper venue '{}' with {} pair(s)",
                    exchange.name,
                    exchange.trading_pairs.len()
                );
                registry.insert(
                    &exchange.name,
                    Arc::new(PaperExchange::new(exchange, feed.clone())),
                );
            }
            Ok(registry)
        }
        TradingMode::Live => Err(TradeError::Validation(
            "live order routing is not available; set trading.mode = \"paper\"".to_string(),
        )),
    }
}

/// Create the market data feed selected in `AppConfig`.
pub fn build_market_data_feed(app_config: &AppConfig) -> Result<Arc<dyn MarketDataFeed>> {
    match app_config.market_data.source {
        MarketDataSource::Binance => {
            let feed = BinanceMarketData::new(&app_config.market_data)?;
            Ok(Arc::new(feed))
        }
        MarketDataSource::Static => Ok(Arc::new(InMemoryFeed::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_mode_builds_one_client_per_exchange() {
        let config = AppConfig::default_config();
        let feed: Arc<dyn MarketDataFeed> = Arc::new(InMemoryFeed::new());
        let registry = build_exchange_clients(&config, feed).expect("paper registry");

        assert_eq!(registry.len(), config.exchanges.len());
        let client = registry.get(&config.exchanges[0].name).expect("client");
        assert!(client.is_simulated());
        assert!(matches!(
            registry.get("nowhere"),
            Err(TradeError::UnknownExchange(_))
        ));
    }

    #[test]
    fn live_mode_is_refused() {
        let mut config = AppConfig::default_config();
        config.trading.mode = TradingMode::Live;
        let feed: Arc<dyn MarketDataFeed> = Arc::new(InMemoryFeed::new());
        let err = build_exchange_clients(&config, feed)
            .err()
            .expect("live mode must fail");
        assert!(err.is_validation());
    }
}
