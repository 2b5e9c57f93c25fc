use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::domain::{Direction, PairKey};

/// One open position as seen by the exposure monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureEntry {
    pub key: PairKey,
    pub direction: Direction,
    pub quantity: Decimal,
    pub current_price: Decimal,
}

impl ExposureEntry {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.current_price
    }
}

/// Aggregate notional exposure against a capital base
#[derive(Debug, Clone)]
pub struct ExposureMonitor {
    max_exposure: Decimal,
    entries: HashMap<PairKey, ExposureEntry>,
}

impl ExposureMonitor {
    pub fn new(max_exposure: Decimal) -> Self {
        Self {
            max_exposure,
            entries: HashMap::new(),
        }
    }

    /// Replace the whole view with a consistent snapshot of open positions
    pub fn sync(&mut self, entries: impl IntoIterator<Item = ExposureEntry>) {
        self.entries = entries.into_iter().map(|e| (e.key.clone(), e)).collect();
    }

    pub fn entry(&self, key: &PairKey) -> Option<&ExposureEntry> {
        self.entries.get(key)
    }

    pub fn position_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_notional(&self) -> Decimal {
        self.entries.values().map(ExposureEntry::notional).sum()
    }

    /// Open notional as a fraction of `capital`
    pub fn total_exposure(&self, capital: Decimal) -> Decimal {
        if capital <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.total_notional() / capital
    }

    /// Exposure fraction after adding `candidate_notional`
    pub fn projected_exposure(&self, candidate_notional: Decimal, capital: Decimal) -> Option<Decimal> {
        if capital <= Decimal::ZERO {
            return None;
        }
        Some((self.total_notional() + candidate_notional) / capital)
    }

    pub fn is_new_position_allowed(&self, candidate_notional: Decimal, capital: Decimal) -> bool {
        self.projected_exposure(candidate_notional, capital)
            .map(|projected| projected <= self.max_exposure)
            .unwrap_or(false)
    }

    pub fn max_exposure(&self) -> Decimal {
        self.max_exposure
    }

    /// Concentration proxy: `1 - unique_pairs / positions`, 0 with at most one position
    pub fn position_correlation(&self) -> Decimal {
        let count = self.entries.len();
        if count <= 1 {
            return Decimal::ZERO;
        }
        let unique: HashSet<&str> = self
            .entries
            .keys()
            .map(|k| k.trading_pair.as_str())
            .collect();
        Decimal::ONE - Decimal::from(unique.len()) / Decimal::from(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(exchange: &str, pair: &str, qty: Decimal, price: Decimal) -> ExposureEntry {
        ExposureEntry {
            key: PairKey::new(exchange, pair),
            direction: Direction::Long,
            quantity: qty,
            current_price: price,
        }
    }

    #[test]
    fn test_projected_exposure_gate() {
        let mut monitor = ExposureMonitor::new(dec!(0.5));
        monitor.sync([entry("a", "BTC/USDT", dec!(0.08), dec!(50000))]);
        assert_eq!(monitor.total_exposure(dec!(10000)), dec!(0.4));

        assert!(monitor.is_new_position_allowed(dec!(1000), dec!(10000)));
        assert!(!monitor.is_new_position_allowed(dec!(1001), dec!(10000)));
        assert!(!monitor.is_new_position_allowed(dec!(1), Decimal::ZERO));
    }

    #[test]
    fn test_sync_replaces_view() {
        let mut monitor = ExposureMonitor::new(dec!(0.5));
        monitor.sync([entry("a", "BTC/USDT", dec!(1), dec!(100))]);
        monitor.sync([entry("b", "ETH/USDT", dec!(2), dec!(10))]);
        assert_eq!(monitor.position_count(), 1);
        assert_eq!(monitor.total_notional(), dec!(20));
        assert!(monitor.entry(&PairKey::new("a", "BTC/USDT")).is_none());

        let eth = monitor.entry(&PairKey::new("b", "ETH/USDT")).expect("synced");
        assert_eq!(eth.direction, Direction::Long);
        assert_eq!(eth.quantity, dec!(2));

        monitor.sync(std::iter::empty());
        assert_eq!(monitor.total_notional(), Decimal::ZERO);
    }

    #[test]
    fn test_position_correlation() {
        let mut monitor = ExposureMonitor::new(dec!(0.5));
        monitor.sync([entry("a", "BTC/USDT", dec!(1), dec!(1))]);
        assert_eq!(monitor.position_correlation(), Decimal::ZERO);

        monitor.sync([
            entry("a", "BTC/USDT", dec!(1), dec!(1)),
            entry("b", "BTC/USDT", dec!(1), dec!(1)),
        ]);
        assert_eq!(monitor.position_correlation(), dec!(0.5));

        monitor.sync([
            entry("a", "BTC/USDT", dec!(1), dec!(1)),
            entry("b", "BTC/USDT", dec!(1), dec!(1)),
            entry("a", "ETH/USDT", dec!(1), dec!(1)),
            entry("b", "ETH/USDT", dec!(1), dec!(1)),
        ]);
        assert_eq!(monitor.position_correlation(), dec!(0.5));
    }
}
