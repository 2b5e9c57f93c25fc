use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::{Candle, Order, OrderRequest, Ticker};
use crate::error::Result;

/// Order-routing capability of one venue
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// True for the simulated venue
    fn is_simulated(&self) -> bool;

    /// Submit an order. Fails without producing an order on insufficient
    /// balance or a missing required price.
    async fn create_order(&self, request: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, order_id: &str, trading_pair: &str) -> Result<bool>;

    async fn fetch_order(&self, order_id: &str, trading_pair: &str) -> Result<Order>;

    /// Currency -> amount
    async fn fetch_balance(&self) -> Result<HashMap<String, Decimal>>;

    /// Give resting orders a chance to fill. Returns the orders that changed.
    async fn process_pending(&self) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }
}

/// Quote and history source
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    async fn fetch_ticker(&self, exchange: &str, trading_pair: &str) -> Result<Ticker>;

    /// Ordered oldest-first
    async fn fetch_historical(
        &self,
        exchange: &str,
        trading_pair: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}
