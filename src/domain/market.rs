use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// Currencies valued at par when summing account balances
pub const QUOTE_CURRENCIES: &[&str] = &["USDT", "USD", "USDC", "BUSD"];

pub fn is_quote_currency(currency: &str) -> bool {
    QUOTE_CURRENCIES
        .iter()
        .any(|q| q.eq_ignore_ascii_case(currency))
}

/// A `BASE/QUOTE` trading pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn parse(raw: &str) -> Result<Self> {
        let (base, quote) = raw
            .split_once('/')
            .filter(|(b, q)| !b.trim().is_empty() && !q.trim().is_empty())
            .ok_or_else(|| OrderError::InvalidPair {
                pair: raw.to_string(),
            })?;

        Ok(Self {
            base: base.trim().to_ascii_uppercase(),
            quote: quote.trim().to_ascii_uppercase(),
        })
    }

    /// Exchange symbol without separator (e.g. `BTCUSDT`)
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Composite key identifying one position slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub exchange: String,
    pub trading_pair: String,
}

impl PairKey {
    pub fn new(exchange: impl Into<String>, trading_pair: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            trading_pair: trading_pair.into(),
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.trading_pair)
    }
}

/// Latest quote for a pair on one venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: String,
    pub trading_pair: String,
    pub close: Decimal,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    pub fn new(
        exchange: impl Into<String>,
        trading_pair: impl Into<String>,
        close: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            trading_pair: trading_pair.into(),
            close,
            bid: None,
            ask: None,
            timestamp,
        }
    }

    pub fn with_quotes(mut self, bid: Decimal, ask: Decimal) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.exchange, &self.trading_pair)
    }

    /// Price used for buy fills (ask, falling back to close)
    pub fn buy_price(&self) -> Decimal {
        self.ask.unwrap_or(self.close)
    }

    /// Price used for sell fills (bid, falling back to close)
    pub fn sell_price(&self) -> Decimal {
        self.bid.unwrap_or(self.close)
    }
}

/// One OHLCV point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}
