use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PairKey;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
    StopLimit,
}

impl OrderType {
    /// Types that must carry a price at creation
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::StopLimit => "STOP_LIMIT",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "market" => Ok(Self::Market),
            "limit" => Ok(Self::Limit),
            "stop_loss" => Ok(Self::StopLoss),
            "take_profit" => Ok(Self::TakeProfit),
            "stop_limit" => Ok(Self::StopLimit),
            other => Err(format!("unknown order type '{}'", other)),
        }
    }
}

/// Order status
///
/// `CREATED -> OPEN -> {PARTIALLY_FILLED -> FILLED} | CANCELED | REJECTED | EXPIRED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Built locally, not yet accepted by the venue
    Created,
    /// Resting on the venue
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::Open | OrderStatus::PartiallyFilled
        )
    }

    /// Statuses that carry newly filled quantity
    pub fn is_fill(&self) -> bool {
        matches!(self, OrderStatus::PartiallyFilled | OrderStatus::Filled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", s)
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub exchange: String,
    pub trading_pair: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub strategy_id: Option<String>,
}

impl OrderRequest {
    pub fn market(exchange: &str, trading_pair: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            exchange: exchange.to_string(),
            trading_pair: trading_pair.to_string(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            strategy_id: None,
        }
    }

    pub fn limit(
        exchange: &str,
        trading_pair: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(exchange, trading_pair, side, quantity)
        }
    }

    pub fn with_strategy(mut self, strategy_id: &str) -> Self {
        self.strategy_id = Some(strategy_id.to_string());
        self
    }
}

/// Order (tracked in our system)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub exchange: String,
    pub trading_pair: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub fees: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

impl Order {
    pub fn from_request(request: &OrderRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: request.client_order_id.clone(),
            exchange: request.exchange.clone(),
            trading_pair: request.trading_pair.clone(),
            order_type: request.order_type,
            side: request.side,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::Created,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            fees: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            strategy_id: request.strategy_id.clone(),
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.exchange, &self.trading_pair)
    }

    pub fn remaining_quantity(&self) -> Decimal {
        (self.quantity - self.filled_quantity).max(Decimal::ZERO)
    }

    /// Record a fill of `quantity` at `price`, folding it into the average
    pub fn apply_fill(&mut self, quantity: Decimal, price: Decimal, fee: Decimal, now: DateTime<Utc>) {
        let prev_filled = self.filled_quantity;
        let new_filled = prev_filled + quantity;
        if new_filled > Decimal::ZERO {
            let prev_value = self.average_fill_price.unwrap_or(Decimal::ZERO) * prev_filled;
            self.average_fill_price = Some((prev_value + price * quantity) / new_filled);
        }
        self.filled_quantity = new_filled;
        self.fees += fee;
        self.status = if new_filled >= self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Immutable record of one fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub order_id: String,
    pub exchange: String,
    pub trading_pair: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

impl Trade {
    pub fn from_fill(
        order: &Order,
        quantity: Decimal,
        price: Decimal,
        fee: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            exchange: order.exchange.clone(),
            trading_pair: order.trading_pair.clone(),
            side: order.side,
            quantity,
            price,
            fee,
            timestamp,
            strategy_id: order.strategy_id.clone(),
        }
    }

    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_classification() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Open.is_active());
        assert!(OrderStatus::PartiallyFilled.is_fill());
        assert!(!OrderStatus::Canceled.is_fill());
    }

    #[test]
    fn test_order_fill_averages_price() {
        let request = OrderRequest::limit("paper", "BTC/USDT", OrderSide::Buy, dec!(2), dec!(100));
        let mut order = Order::from_request(&request, Utc::now());
        assert_eq!(order.status, OrderStatus::Created);

        order.apply_fill(dec!(1), dec!(100), dec!(0.1), Utc::now());
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining_quantity(), dec!(1));

        order.apply_fill(dec!(1), dec!(110), dec!(0.11), Utc::now());
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_fill_price, Some(dec!(105)));
        assert_eq!(order.fees, dec!(0.21));
    }

    #[test]
    fn test_order_type_parse() {
        assert_eq!("limit".parse::<OrderType>().expect("limit"), OrderType::Limit);
        assert_eq!("MARKET".parse::<OrderType>().expect("market"), OrderType::Market);
        assert!("twap".parse::<OrderType>().is_err());
        assert!(OrderType::Limit.requires_price());
        assert!(!OrderType::Market.requires_price());
    }
}
