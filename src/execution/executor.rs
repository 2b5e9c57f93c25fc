use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::{
    Direction, Order, OrderRequest, OrderType, PairKey, Position, Signal, SignalType, Trade,
};
use crate::error::{OrderError, Result, TradeError};
use crate::exchange::ExchangeRegistry;

use super::ledger::{FillOutcome, PositionLedger};

/// Filled quantity already folded into the ledger for one order
#[derive(Debug, Clone, Copy, Default)]
struct ReconciledFill {
    quantity: Decimal,
    average_price: Decimal,
    fees: Decimal,
}

/// A reconciled fill and its effect on the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub trade: Trade,
    pub outcome: FillOutcome,
}

/// Order executor for managing order lifecycle
///
/// Owns the open-order map, the order/trade history and the position ledger.
/// Every newly filled quantity is reconciled into the ledger exactly once,
/// whether it arrives at submission, through a simulated limit fill, or
/// through a later status fetch.
pub struct OrderExecutor {
    exchanges: ExchangeRegistry,
    default_order_type: OrderType,
    ledger: PositionLedger,
    open_orders: HashMap<String, Order>,
    reconciled: HashMap<String, ReconciledFill>,
    pending_stops: HashMap<String, Decimal>,
    order_history: Vec<Order>,
    trades: Vec<Trade>,
    unseen_fills: Vec<Fill>,
}

impl OrderExecutor {
    pub fn new(exchanges: ExchangeRegistry, default_order_type: OrderType) -> Self {
        Self {
            exchanges,
            default_order_type,
            ledger: PositionLedger::new(),
            open_orders: HashMap::new(),
            reconciled: HashMap::new(),
            pending_stops: HashMap::new(),
            order_history: Vec::new(),
            trades: Vec::new(),
            unseen_fills: Vec::new(),
        }
    }

    /// Submit an admitted signal as an order of `quantity`.
    ///
    /// Fails without producing an order when the signal has expired, the
    /// venue is unknown, or the venue refuses the order.
    pub async fn execute_signal(
        &mut self,
        signal: &Signal,
        quantity: Decimal,
        stop_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        if signal.is_expired(now) {
            info!("Signal {} expired before execution", signal.id);
            return Err(TradeError::SignalExpired(signal.id.clone()));
        }
        if quantity <= Decimal::ZERO {
            return Err(OrderError::InvalidQuantity { quantity }.into());
        }

        let client = self.exchanges.get(&signal.exchange)?.clone();
        let side = signal.order_side();
        let request = match self.default_order_type {
            OrderType::Market => {
                OrderRequest::market(&signal.exchange, &signal.trading_pair, side, quantity)
            }
            other => {
                let price = signal
                    .price
                    .ok_or_else(|| TradeError::MissingLimitPrice(other.to_string()))?;
                OrderRequest {
                    order_type: other,
                    price: Some(price),
                    ..OrderRequest::market(&signal.exchange, &signal.trading_pair, side, quantity)
                }
            }
        }
        .with_strategy(&signal.strategy_id);

        let order = match client.create_order(&request).await {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    "Order for signal {} ({} {} {}) failed: {}",
                    signal.id, side, quantity, signal.trading_pair, e
                );
                return Err(e);
            }
        };
        info!(
            "Order {} submitted for signal {}: {} {} {} {} -> {}",
            order.id, signal.id, order.order_type, side, quantity, order.trading_pair, order.status
        );

        if signal.signal_type == SignalType::Entry {
            if let Some(stop) = stop_price {
                self.pending_stops.insert(order.id.clone(), stop);
            }
        }
        self.track(order.clone(), now);
        Ok(order)
    }

    /// Refresh every open order. Simulated venues first get a chance to fill
    /// resting orders. Fetch failures leave the known state untouched.
    /// Returns the orders whose state changed.
    pub async fn update_all_orders(&mut self, now: DateTime<Utc>) -> Vec<Order> {
        let mut changed = Vec::new();

        let clients: Vec<_> = self
            .exchanges
            .iter()
            .map(|(name, client)| (name.to_string(), client.clone()))
            .collect();
        for (name, client) in clients {
            if !client.is_simulated() {
                continue;
            }
            match client.process_pending().await {
                Ok(orders) => {
                    for order in orders {
                        if self.track(order.clone(), now) {
                            changed.push(order);
                        }
                    }
                }
                Err(e) => warn!("[{}] pending order processing failed: {}", name, e),
            }
        }

        let open: Vec<(String, String, String)> = self
            .open_orders
            .values()
            .map(|o| (o.id.clone(), o.exchange.clone(), o.trading_pair.clone()))
            .collect();
        for (order_id, exchange, trading_pair) in open {
            let client = match self.exchanges.get(&exchange) {
                Ok(client) => client.clone(),
                Err(e) => {
                    warn!("Cannot refresh order {}: {}", order_id, e);
                    continue;
                }
            };
            match client.fetch_order(&order_id, &trading_pair).await {
                Ok(order) => {
                    if self.track(order.clone(), now) {
                        changed.push(order);
                    }
                }
                Err(e) => warn!("Failed to fetch order {} on {}: {}", order_id, exchange, e),
            }
        }

        changed
    }

    pub async fn cancel_order(&mut self, order_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(order) = self.open_orders.get(order_id) else {
            if let Some(done) = self.order_history.iter().find(|o| o.id == order_id) {
                return Err(OrderError::AlreadyTerminal {
                    order_id: order_id.to_string(),
                    status: done.status.to_string(),
                }
                .into());
            }
            return Err(OrderError::NotFound {
                order_id: order_id.to_string(),
            }
            .into());
        };

        let client = self.exchanges.get(&order.exchange)?.clone();
        let trading_pair = order.trading_pair.clone();
        let canceled = client.cancel_order(order_id, &trading_pair).await?;
        if canceled {
            let order = client.fetch_order(order_id, &trading_pair).await?;
            self.track(order, now);
        }
        Ok(canceled)
    }

    /// Fold an order snapshot into local state. Returns true if the status or
    /// filled quantity moved.
    fn track(&mut self, order: Order, now: DateTime<Utc>) -> bool {
        let changed = match self.open_orders.get(&order.id) {
            Some(known) => {
                known.status != order.status || known.filled_quantity != order.filled_quantity
            }
            None => true,
        };
        if changed {
            debug!("Order {} is now {} ({} filled)", order.id, order.status, order.filled_quantity);
        }

        self.reconcile(&order, now);

        if order.status.is_terminal() {
            self.open_orders.remove(&order.id);
            self.reconciled.remove(&order.id);
            self.pending_stops.remove(&order.id);
            info!("Order {} {}", order.id, order.status);
            self.order_history.push(order);
        } else {
            self.open_orders.insert(order.id.clone(), order);
        }
        changed
    }

    fn reconcile(&mut self, order: &Order, now: DateTime<Utc>) {
        let previous = self.reconciled.get(&order.id).copied().unwrap_or_default();
        let delta = order.filled_quantity - previous.quantity;
        if delta <= Decimal::ZERO {
            return;
        }

        let average = order
            .average_fill_price
            .or(order.price)
            .unwrap_or(Decimal::ZERO);
        let price = (average * order.filled_quantity - previous.average_price * previous.quantity) / delta;
        let fee = (order.fees - previous.fees).max(Decimal::ZERO);

        let key = order.key();
        let outcome = self.ledger.apply_fill(
            &key,
            order.side,
            delta,
            price,
            order.strategy_id.as_deref(),
            now,
        );
        if matches!(outcome, FillOutcome::Opened) {
            if let Some(stop) = self.pending_stops.get(&order.id) {
                self.ledger.set_stop(&key, Some(*stop));
            }
        }

        let trade = Trade::from_fill(order, delta, price, fee, now);
        self.trades.push(trade.clone());
        self.unseen_fills.push(Fill { trade, outcome });
        self.reconciled.insert(
            order.id.clone(),
            ReconciledFill {
                quantity: order.filled_quantity,
                average_price: average,
                fees: order.fees,
            },
        );
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PositionLedger {
        &mut self.ledger
    }

    pub fn position(&self, key: &PairKey) -> Option<&Position> {
        self.ledger.position(key)
    }

    pub fn open_directions(&self) -> HashMap<PairKey, Direction> {
        self.ledger.open_directions()
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.open_orders.values().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.open_orders
            .get(order_id)
            .or_else(|| self.order_history.iter().rev().find(|o| o.id == order_id))
    }

    /// Most recent terminal orders, newest first
    pub fn order_history(&self, limit: usize) -> Vec<&Order> {
        self.order_history.iter().rev().take(limit).collect()
    }

    pub fn trade_history(&self) -> &[Trade] {
        &self.trades
    }

    /// Fills reconciled since the last call
    pub fn drain_new_fills(&mut self) -> Vec<Fill> {
        std::mem::take(&mut self.unseen_fills)
    }
}
