//! Simulated venue for paper trading
//!
//! Keeps per-currency balances in memory. Market orders fill at submission
//! against the feed's quote moved by the configured slippage; limit orders rest
//! until `process_pending` sees the market cross the limit.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::domain::{Order, OrderRequest, OrderSide, OrderStatus, OrderType, TradingPair};
use crate::error::{OrderError, Result, TradeError};
use crate::exchange::{ExchangeClient, MarketDataFeed};

#[derive(Debug, Default)]
struct PaperBook {
    balances: HashMap<String, Decimal>,
    orders: HashMap<String, Order>,
    /// Resting limit order ids in submission order
    resting: Vec<String>,
}

impl PaperBook {
    fn balance(&self, currency: &str) -> Decimal {
        self.balances.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    fn check_funds(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        fee_rate: Decimal,
    ) -> Result<()> {
        let (currency, required) = match side {
            OrderSide::Buy => (&pair.quote, quantity * price * (Decimal::ONE + fee_rate)),
            OrderSide::Sell => (&pair.base, quantity),
        };
        let available = self.balance(currency);
        if available < required {
            return Err(TradeError::InsufficientBalance {
                currency: currency.clone(),
                required,
                available,
            });
        }
        Ok(())
    }

    /// Move balances for a fill and charge the quote-denominated fee
    fn settle(
        &mut self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
    ) {
        let notional = quantity * price;
        let (base_delta, quote_delta) = match side {
            OrderSide::Buy => (quantity, -(notional + fee)),
            OrderSide::Sell => (-quantity, notional - fee),
        };
        *self.balances.entry(pair.base.clone()).or_default() += base_delta;
        *self.balances.entry(pair.quote.clone()).or_default() += quote_delta;
    }
}

pub struct PaperExchange {
    name: String,
    maker_fee: Decimal,
    taker_fee: Decimal,
    slippage: Decimal,
    feed: Arc<dyn MarketDataFeed>,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(config: &ExchangeConfig, feed: Arc<dyn MarketDataFeed>) -> Self {
        let balances = config
            .initial_balances
            .iter()
            .map(|(currency, amount)| (currency.to_ascii_uppercase(), *amount))
            .collect();

        Self {
            name: config.name.clone(),
            maker_fee: config.maker_fee,
            taker_fee: config.taker_fee,
            slippage: config.slippage,
            feed,
            book: Mutex::new(PaperBook {
                balances,
                ..PaperBook::default()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn balance(&self, currency: &str) -> Decimal {
        self.book.lock().await.balance(&currency.to_ascii_uppercase())
    }

    /// Quote price moved against the taker
    fn market_fill_price(&self, side: OrderSide, quote: Decimal) -> Decimal {
        match side {
            OrderSide::Buy => quote * (Decimal::ONE + self.slippage),
            OrderSide::Sell => quote * (Decimal::ONE - self.slippage),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    fn is_simulated(&self) -> bool {
        true
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        if request.quantity <= Decimal::ZERO {
            return Err(OrderError::InvalidQuantity {
                quantity: request.quantity,
            }
            .into());
        }
        let pair = TradingPair::parse(&request.trading_pair)?;

        let fill_price = match request.order_type {
            OrderType::Market => {
                let ticker = self.feed.fetch_ticker(&self.name, &request.trading_pair).await?;
                let quote = match request.side {
                    OrderSide::Buy => ticker.buy_price(),
                    OrderSide::Sell => ticker.sell_price(),
                };
                self.market_fill_price(request.side, quote)
            }
            OrderType::Limit => request
                .price
                .ok_or_else(|| TradeError::MissingLimitPrice(request.order_type.to_string()))?,
            other => {
                if request.price.is_none() {
                    return Err(TradeError::MissingLimitPrice(other.to_string()));
                }
                return Err(TradeError::Validation(format!(
                    "{} orders are not supported by the paper venue",
                    other
                )));
            }
        };

        let now = Utc::now();
        let mut book = self.book.lock().await;
        let fee_rate = match request.order_type {
            OrderType::Market => self.taker_fee,
            _ => self.maker_fee,
        };
        book.check_funds(&pair, request.side, request.quantity, fill_price, fee_rate)?;

        let mut order = Order::from_request(request, now);
        order.set_status(OrderStatus::Open, now);

        if request.order_type == OrderType::Market {
            let fee = request.quantity * fill_price * self.taker_fee;
            book.settle(&pair, request.side, request.quantity, fill_price, fee);
            order.apply_fill(request.quantity, fill_price, fee, now);
            info!(
                "[{}] {} {} {} filled at {} (fee {})",
                self.name, order.side, order.quantity, order.trading_pair, fill_price, fee
            );
        } else {
            book.resting.push(order.id.clone());
            debug!(
                "[{}] {} limit {} {} resting at {}",
                self.name, order.side, order.quantity, order.trading_pair, fill_price
            );
        }

        book.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str, _trading_pair: &str) -> Result<bool> {
        let mut book = self.book.lock().await;
        let order = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| TradeError::OrderNotFound(order_id.to_string()))?;

        if order.status.is_terminal() {
            return Ok(false);
        }
        order.set_status(OrderStatus::Canceled, Utc::now());
        book.resting.retain(|id| id != order_id);
        info!("[{}] order {} canceled", self.name, order_id);
        Ok(true)
    }

    async fn fetch_order(&self, order_id: &str, _trading_pair: &str) -> Result<Order> {
        self.book
            .lock()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| TradeError::OrderNotFound(order_id.to_string()))
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, Decimal>> {
        Ok(self.book.lock().await.balances.clone())
    }

    async fn process_pending(&self) -> Result<Vec<Order>> {
        let resting: Vec<(String, String)> = {
            let book = self.book.lock().await;
            book.resting
                .iter()
                .filter_map(|id| book.orders.get(id))
                .map(|o| (o.id.clone(), o.trading_pair.clone()))
                .collect()
        };

        let mut changed = Vec::new();
        for (order_id, trading_pair) in resting {
            let ticker = match self.feed.fetch_ticker(&self.name, &trading_pair).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!("[{}] no quote for resting order {}: {}", self.name, order_id, e);
                    continue;
                }
            };

            let now = Utc::now();
            let mut book = self.book.lock().await;
            let Some(order) = book.orders.get(&order_id).cloned() else {
                continue;
            };
            if order.status.is_terminal() {
                continue;
            }
            let Some(limit) = order.price else {
                continue;
            };

            let crossed = match order.side {
                OrderSide::Buy => ticker.close <= limit,
                OrderSide::Sell => ticker.close >= limit,
            };
            if !crossed {
                continue;
            }

            let pair = TradingPair::parse(&order.trading_pair)?;
            let quantity = order.remaining_quantity();
            let mut updated = order;
            match book.check_funds(&pair, updated.side, quantity, limit, self.maker_fee) {
                Ok(()) => {
                    let fee = quantity * limit * self.maker_fee;
                    book.settle(&pair, updated.side, quantity, limit, fee);
                    updated.apply_fill(quantity, limit, fee, now);
                    info!(
                        "[{}] limit {} {} {} filled at {}",
                        self.name, updated.side, quantity, updated.trading_pair, limit
                    );
                }
                Err(e) => {
                    warn!("[{}] rejecting limit order {}: {}", self.name, order_id, e);
                    updated.set_status(OrderStatus::Rejected, now);
                }
            }

            book.resting.retain(|id| id != &order_id);
            book.orders.insert(order_id, updated.clone());
            changed.push(updated);
        }

        Ok(changed)
    }
}
