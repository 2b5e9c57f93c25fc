use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, PairKey};

/// Aggregated open exposure for one (exchange, pair)
///
/// `side` is fixed for the lifetime of the position: opposite fills reduce it,
/// they never flip it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub exchange: String,
    pub trading_pair: String,
    pub side: Direction,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub stop_loss_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub strategy_id: Option<String>,
}

impl Position {
    pub fn open(
        key: &PairKey,
        side: Direction,
        price: Decimal,
        quantity: Decimal,
        strategy_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            exchange: key.exchange.clone(),
            trading_pair: key.trading_pair.clone(),
            side,
            entry_price: price,
            quantity,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            stop_loss_price: None,
            opened_at: now,
            last_update_time: now,
            strategy_id,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.exchange, &self.trading_pair)
    }

    /// Cost basis of the open quantity
    pub fn cost_basis(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    pub fn notional(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// PnL of the open quantity at `price`
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            Direction::Long => (price - self.entry_price) * self.quantity,
            Direction::Short => (self.entry_price - price) * self.quantity,
        }
    }

    pub fn mark(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.unrealized_pnl = self.pnl_at(price);
        self.last_update_time = now;
    }

    /// Unrealized PnL as a fraction of cost basis
    pub fn pnl_ratio(&self) -> Decimal {
        let basis = self.cost_basis();
        if basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl / basis
        }
    }

    /// True when `price` is through the stop (LONG at or below, SHORT at or above)
    pub fn stop_triggered(&self, price: Decimal) -> bool {
        match (self.side, self.stop_loss_price) {
            (Direction::Long, Some(stop)) => price <= stop,
            (Direction::Short, Some(stop)) => price >= stop,
            (_, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: Direction) -> Position {
        Position::open(
            &PairKey::new("paper", "BTC/USDT"),
            side,
            dec!(100),
            dec!(2),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_long_and_short_pnl() {
        let mut long = position(Direction::Long);
        long.mark(dec!(110), Utc::now());
        assert_eq!(long.unrealized_pnl, dec!(20));
        assert_eq!(long.pnl_ratio(), dec!(0.1));

        let mut short = position(Direction::Short);
        short.mark(dec!(110), Utc::now());
        assert_eq!(short.unrealized_pnl, dec!(-20));
    }

    #[test]
    fn test_stop_trigger() {
        let mut long = position(Direction::Long);
        assert!(!long.stop_triggered(dec!(1)));
        long.stop_loss_price = Some(dec!(95));
        assert!(long.stop_triggered(dec!(95)));
        assert!(!long.stop_triggered(dec!(96)));

        let mut short = position(Direction::Short);
        short.stop_loss_price = Some(dec!(105));
        assert!(short.stop_triggered(dec!(106)));
        assert!(!short.stop_triggered(dec!(104)));
    }
}
