use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the trading bot
#[derive(Error, Debug)]
pub enum TradeError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    // Order execution errors
    #[error("Insufficient {currency} balance: required {required}, available {available}")]
    InsufficientBalance {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Limit price is required for {0} orders")]
    MissingLimitPrice(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Signal {0} expired before execution")]
    SignalExpired(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TradeError {
    /// Errors that fail a single operation and must not be retried
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TradeError::Validation(_)
                | TradeError::InsufficientBalance { .. }
                | TradeError::MissingLimitPrice(_)
                | TradeError::UnknownExchange(_)
                | TradeError::SignalExpired(_)
                | TradeError::OrderRejected(_)
        )
    }

    /// Collaborator failures that the next cycle retries
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TradeError::Http(_)
                | TradeError::RateLimited(_)
                | TradeError::MarketDataUnavailable(_)
                | TradeError::InvalidMarketData(_)
                | TradeError::Json(_)
        )
    }
}

/// Result type alias for TradeError
pub type Result<T> = std::result::Result<T, TradeError>;

/// Specific error types for order execution
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Order {order_id} already in terminal state {status}")]
    AlreadyTerminal { order_id: String, status: String },

    #[error("Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: Decimal },

    #[error("Invalid trading pair: {pair}")]
    InvalidPair { pair: String },
}

impl From<OrderError> for TradeError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound { order_id } => TradeError::OrderNotFound(order_id),
            other => TradeError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_balance_is_validation() {
        let err = TradeError::InsufficientBalance {
            currency: "USDT".to_string(),
            required: dec!(150),
            available: dec!(100),
        };
        assert!(err.is_validation());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("USDT"));
    }

    #[test]
    fn market_data_failure_is_transient() {
        let err = TradeError::MarketDataUnavailable("binance BTC/USDT".to_string());
        assert!(err.is_transient());
        assert!(!err.is_validation());
    }

    #[test]
    fn order_not_found_converts() {
        let err: TradeError = OrderError::NotFound {
            order_id: "abc".to_string(),
        }
        .into();
        assert!(matches!(err, TradeError::OrderNotFound(id) if id == "abc"));
    }

    #[test]
    fn invalid_config_joins_messages() {
        let err = TradeError::InvalidConfig(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }
}
