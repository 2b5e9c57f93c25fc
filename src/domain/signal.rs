use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::{OrderSide, PairKey};

/// Whether a signal opens or closes exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Entry,
    Exit,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Entry => write!(f, "ENTRY"),
            SignalType::Exit => write!(f, "EXIT"),
        }
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Direction of the exposure a fill on `side` opens
    pub fn from_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Direction::Long,
            OrderSide::Sell => Direction::Short,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An intent to open or close exposure, produced by a strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub strategy_id: String,
    pub trading_pair: String,
    pub exchange: String,
    pub signal_type: SignalType,
    pub direction: Direction,
    /// Confidence in [0, 1]
    pub strength: Decimal,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_id: &str,
        exchange: &str,
        trading_pair: &str,
        signal_type: SignalType,
        direction: Direction,
        strength: Decimal,
        price: Option<Decimal>,
        quantity: Decimal,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            strategy_id: strategy_id.to_string(),
            trading_pair: trading_pair.to_string(),
            exchange: exchange.to_string(),
            signal_type,
            direction,
            strength: strength.clamp(Decimal::ZERO, Decimal::ONE),
            price,
            quantity,
            timestamp: now,
            expiration: now + ttl,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.exchange, &self.trading_pair)
    }

    /// Expiry is checked when the signal is consumed, not when it is created
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    /// ENTRY+LONG and EXIT+SHORT buy; ENTRY+SHORT and EXIT+LONG sell
    pub fn order_side(&self) -> OrderSide {
        match (self.signal_type, self.direction) {
            (SignalType::Entry, Direction::Long) | (SignalType::Exit, Direction::Short) => {
                OrderSide::Buy
            }
            (SignalType::Entry, Direction::Short) | (SignalType::Exit, Direction::Long) => {
                OrderSide::Sell
            }
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(signal_type: SignalType, direction: Direction) -> Signal {
        Signal::new(
            "ma",
            "paper",
            "BTC/USDT",
            signal_type,
            direction,
            dec!(1),
            Some(dec!(100)),
            dec!(1),
            Utc::now(),
            Duration::minutes(5),
        )
    }

    #[test]
    fn test_order_side_mapping() {
        assert_eq!(signal(SignalType::Entry, Direction::Long).order_side(), OrderSide::Buy);
        assert_eq!(signal(SignalType::Entry, Direction::Short).order_side(), OrderSide::Sell);
        assert_eq!(signal(SignalType::Exit, Direction::Long).order_side(), OrderSide::Sell);
        assert_eq!(signal(SignalType::Exit, Direction::Short).order_side(), OrderSide::Buy);
    }

    #[test]
    fn test_expiry_is_strictly_after_expiration() {
        let s = signal(SignalType::Entry, Direction::Long);
        assert!(!s.is_expired(s.expiration));
        assert!(s.is_expired(s.expiration + Duration::milliseconds(1)));
    }

    #[test]
    fn test_strength_is_clamped() {
        let s = Signal::new(
            "arb",
            "paper",
            "BTC/USDT",
            SignalType::Entry,
            Direction::Long,
            dec!(3.5),
            None,
            dec!(1),
            Utc::now(),
            Duration::seconds(5),
        );
        assert_eq!(s.strength, dec!(1));
    }
}
