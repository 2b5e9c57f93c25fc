//! Position ledger
//!
//! Folds fills into at most one position per `(exchange, pair)`. Same-side
//! fills re-average the entry price; opposite-side fills reduce the position
//! and realize PnL on the reduced quantity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::domain::{Direction, OrderSide, PairKey, Position};
use crate::risk::ExposureEntry;

/// What a fill did to the ledger
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillOutcome {
    Opened,
    Increased,
    Reduced { realized: Decimal },
    Closed { realized: Decimal },
}

impl FillOutcome {
    pub fn realized(&self) -> Decimal {
        match self {
            FillOutcome::Reduced { realized } | FillOutcome::Closed { realized } => *realized,
            _ => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: HashMap<PairKey, Position>,
    total_realized_pnl: Decimal,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fill(
        &mut self,
        key: &PairKey,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        strategy_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> FillOutcome {
        let fill_direction = Direction::from_side(side);

        let Some(position) = self.positions.get_mut(key) else {
            let position = Position::open(
                key,
                fill_direction,
                price,
                quantity,
                strategy_id.map(str::to_string),
                now,
            );
            info!("Opened {} {} {} @ {}", fill_direction, quantity, key, price);
            self.positions.insert(key.clone(), position);
            return FillOutcome::Opened;
        };

        if position.side == fill_direction {
            let new_quantity = position.quantity + quantity;
            position.entry_price =
                (position.entry_price * position.quantity + price * quantity) / new_quantity;
            position.quantity = new_quantity;
            position.last_update_time = now;
            info!(
                "Increased {} {} to {} @ avg {}",
                position.side, key, new_quantity, position.entry_price
            );
            return FillOutcome::Increased;
        }

        let reduced = quantity.min(position.quantity);
        let realized = match position.side {
            Direction::Long => (price - position.entry_price) * reduced,
            Direction::Short => (position.entry_price - price) * reduced,
        };
        self.total_realized_pnl += realized;
        position.realized_pnl += realized;
        position.last_update_time = now;

        if quantity >= position.quantity {
            if quantity > position.quantity {
                warn!(
                    "Fill of {} on {} exceeds open quantity {}; excess ignored",
                    quantity, key, position.quantity
                );
            }
            info!("Closed {} {} (realized {})", position.side, key, realized);
            self.positions.remove(key);
            FillOutcome::Closed { realized }
        } else {
            position.quantity -= quantity;
            info!(
                "Reduced {} {} to {} (realized {})",
                position.side, key, position.quantity, realized
            );
            FillOutcome::Reduced { realized }
        }
    }

    /// Recompute unrealized PnL for one position at `price`
    pub fn mark_to_market(&mut self, key: &PairKey, price: Decimal, now: DateTime<Utc>) -> Option<&Position> {
        let position = self.positions.get_mut(key)?;
        position.mark(price, now);
        Some(&*position)
    }

    pub fn set_stop(&mut self, key: &PairKey, stop: Option<Decimal>) -> bool {
        match self.positions.get_mut(key) {
            Some(position) => {
                position.stop_loss_price = stop;
                true
            }
            None => false,
        }
    }

    pub fn position(&self, key: &PairKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn open_directions(&self) -> HashMap<PairKey, Direction> {
        self.positions
            .iter()
            .map(|(k, p)| (k.clone(), p.side))
            .collect()
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.total_realized_pnl
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Exposure view priced with `prices`, falling back to entry price
    pub fn exposure_entries(&self, prices: &HashMap<PairKey, Decimal>) -> Vec<ExposureEntry> {
        self.positions
            .iter()
            .map(|(key, p)| ExposureEntry {
                key: key.clone(),
                direction: p.side,
                quantity: p.quantity,
                current_price: prices.get(key).copied().unwrap_or(p.entry_price),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> PairKey {
        PairKey::new("paper", "BTC/USDT")
    }

    #[test]
    fn test_same_side_fills_average_entry() {
        let mut ledger = PositionLedger::new();
        let now = Utc::now();
        assert_eq!(
            ledger.apply_fill(&key(), OrderSide::Buy, dec!(1), dec!(50000), Some("ma"), now),
            FillOutcome::Opened
        );
        assert_eq!(
            ledger.apply_fill(&key(), OrderSide::Buy, dec!(1), dec!(52000), Some("ma"), now),
            FillOutcome::Increased
        );

        let position = ledger.position(&key()).expect("open");
        assert_eq!(position.side, Direction::Long);
        assert_eq!(position.entry_price, dec!(51000));
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.strategy_id.as_deref(), Some("ma"));
    }

    #[test]
    fn test_partial_reduction_realizes_pnl() {
        let mut ledger = PositionLedger::new();
        let now = Utc::now();
        ledger.apply_fill(&key(), OrderSide::Buy, dec!(2), dec!(51000), None, now);

        let outcome = ledger.apply_fill(&key(), OrderSide::Sell, dec!(0.5), dec!(53000), None, now);
        assert_eq!(outcome, FillOutcome::Reduced { realized: dec!(1000) });

        let position = ledger.position(&key()).expect("still open");
        assert_eq!(position.quantity, dec!(1.5));
        assert_eq!(position.entry_price, dec!(51000));
        assert_eq!(position.realized_pnl, dec!(1000));
    }

    #[test]
    fn test_short_reduction_inverts_sign() {
        let mut ledger = PositionLedger::new();
        let now = Utc::now();
        ledger.apply_fill(&key(), OrderSide::Sell, dec!(1), dec!(100), None, now);
        let outcome = ledger.apply_fill(&key(), OrderSide::Buy, dec!(1), dec!(90), None, now);
        assert_eq!(outcome, FillOutcome::Closed { realized: dec!(10) });
        assert!(ledger.position(&key()).is_none());
        assert_eq!(ledger.total_realized_pnl(), dec!(10));
    }

    #[test]
    fn test_oversized_exit_closes_without_flipping() {
        let mut ledger = PositionLedger::new();
        let now = Utc::now();
        ledger.apply_fill(&key(), OrderSide::Buy, dec!(1), dec!(100), None, now);
        let outcome = ledger.apply_fill(&key(), OrderSide::Sell, dec!(3), dec!(110), None, now);
        assert_eq!(outcome, FillOutcome::Closed { realized: dec!(10) });
        assert!(ledger.is_empty());

        // A later sell opens a fresh short
        ledger.apply_fill(&key(), OrderSide::Sell, dec!(1), dec!(120), None, now);
        assert_eq!(ledger.position(&key()).map(|p| p.side), Some(Direction::Short));
    }

    #[test]
    fn test_mark_to_market_and_exposure() {
        let mut ledger = PositionLedger::new();
        let now = Utc::now();
        ledger.apply_fill(&key(), OrderSide::Buy, dec!(2), dec!(100), None, now);

        let position = ledger.mark_to_market(&key(), dec!(95), now).expect("open");
        assert_eq!(position.unrealized_pnl, dec!(-10));
        assert_eq!(ledger.total_unrealized_pnl(), dec!(-10));

        let entries = ledger.exposure_entries(&HashMap::new());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].notional(), dec!(200));
        assert!(ledger.mark_to_market(&PairKey::new("x", "Y/Z"), dec!(1), now).is_none());
    }
}
