//! In-process market data feed
//!
//! Quotes and candles are pushed in by the owner; used for tests and replays.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::{Candle, PairKey, Ticker};
use crate::error::{Result, TradeError};
use crate::exchange::MarketDataFeed;

#[derive(Default)]
pub struct InMemoryFeed {
    tickers: RwLock<HashMap<PairKey, Ticker>>,
    history: RwLock<HashMap<PairKey, Vec<Candle>>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_ticker(&self, ticker: Ticker) {
        self.tickers.write().await.insert(ticker.key(), ticker);
    }

    /// Set a last price without bid/ask
    pub async fn set_price(&self, exchange: &str, trading_pair: &str, price: Decimal) {
        self.set_ticker(Ticker::new(exchange, trading_pair, price, Utc::now()))
            .await;
    }

    /// Set bid/ask with the mid as last price
    pub async fn set_quotes(&self, exchange: &str, trading_pair: &str, bid: Decimal, ask: Decimal) {
        let mid = (bid + ask) / Decimal::TWO;
        self.set_ticker(Ticker::new(exchange, trading_pair, mid, Utc::now()).with_quotes(bid, ask))
            .await;
    }

    pub async fn remove_ticker(&self, exchange: &str, trading_pair: &str) {
        self.tickers
            .write()
            .await
            .remove(&PairKey::new(exchange, trading_pair));
    }

    pub async fn set_history(&self, exchange: &str, trading_pair: &str, candles: Vec<Candle>) {
        self.history
            .write()
            .await
            .insert(PairKey::new(exchange, trading_pair), candles);
    }
}

#[async_trait]
impl MarketDataFeed for InMemoryFeed {
    async fn fetch_ticker(&self, exchange: &str, trading_pair: &str) -> Result<Ticker> {
        self.tickers
            .read()
            .await
            .get(&PairKey::new(exchange, trading_pair))
            .cloned()
            .ok_or_else(|| {
                TradeError::MarketDataUnavailable(format!("no ticker for {exchange} {trading_pair}"))
            })
    }

    async fn fetch_historical(
        &self,
        exchange: &str,
        trading_pair: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let history = self.history.read().await;
        let candles = history
            .get(&PairKey::new(exchange, trading_pair))
            .ok_or_else(|| {
                TradeError::MarketDataUnavailable(format!("no history for {exchange} {trading_pair}"))
            })?;

        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ONE,
        }
    }

    #[tokio::test]
    async fn test_ticker_round_trip() {
        let feed = InMemoryFeed::new();
        assert!(feed.fetch_ticker("a", "BTC/USDT").await.is_err());

        feed.set_quotes("a", "BTC/USDT", dec!(99), dec!(101)).await;
        let ticker = feed.fetch_ticker("a", "BTC/USDT").await.expect("ticker");
        assert_eq!(ticker.close, dec!(100));
        assert_eq!(ticker.ask, Some(dec!(101)));

        feed.remove_ticker("a", "BTC/USDT").await;
        assert!(feed.fetch_ticker("a", "BTC/USDT").await.is_err());
    }

    #[tokio::test]
    async fn test_history_returns_latest_points() {
        let feed = InMemoryFeed::new();
        let candles = (1..=5).map(|i| candle(Decimal::from(i))).collect();
        feed.set_history("a", "BTC/USDT", candles).await;

        let latest = feed
            .fetch_historical("a", "BTC/USDT", "1d", 3)
            .await
            .expect("history");
        let closes: Vec<_> = latest.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![dec!(3), dec!(4), dec!(5)]);
    }
}
