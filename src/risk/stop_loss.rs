use rust_decimal::Decimal;

use crate::config::{RiskConfig, TrailingStopConfig};
use crate::domain::Direction;

/// Initial and trailing stop prices
#[derive(Debug, Clone)]
pub struct StopLossManager {
    risk_multiplier: Decimal,
    trailing: TrailingStopConfig,
}

impl StopLossManager {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            risk_multiplier: config.risk_multiplier,
            trailing: config.trailing_stop.clone(),
        }
    }

    /// `entry -/+ volatility * risk_multiplier` for LONG/SHORT
    pub fn calculate_stop_loss(
        &self,
        entry_price: Decimal,
        direction: Direction,
        volatility: Decimal,
    ) -> Decimal {
        let distance = volatility * self.risk_multiplier;
        match direction {
            Direction::Long => entry_price - distance,
            Direction::Short => entry_price + distance,
        }
    }

    /// Ratchet the stop toward the price; never loosens it
    pub fn update_trailing_stop(
        &self,
        direction: Direction,
        current_price: Decimal,
        current_stop: Option<Decimal>,
    ) -> Option<Decimal> {
        if !self.trailing.enabled {
            return current_stop;
        }

        let candidate = match direction {
            Direction::Long => current_price * (Decimal::ONE - self.trailing.percent),
            Direction::Short => current_price * (Decimal::ONE + self.trailing.percent),
        };

        match (direction, current_stop) {
            (_, None) => Some(candidate),
            (Direction::Long, Some(stop)) => Some(stop.max(candidate)),
            (Direction::Short, Some(stop)) => Some(stop.min(candidate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn manager() -> StopLossManager {
        StopLossManager::new(&RiskConfig::default())
    }

    #[test]
    fn test_initial_stop() {
        let m = manager();
        assert_eq!(m.calculate_stop_loss(dec!(100), Direction::Long, dec!(1.5)), dec!(97));
        assert_eq!(m.calculate_stop_loss(dec!(100), Direction::Short, dec!(1.5)), dec!(103));
    }

    #[test]
    fn test_long_trailing_stop_only_rises() {
        let m = manager();
        let mut stop = Some(dec!(90));
        let mut last = dec!(90);
        for price in [dec!(100), dec!(120), dec!(80), dec!(110), dec!(130), dec!(50)] {
            stop = m.update_trailing_stop(Direction::Long, price, stop);
            let current = stop.expect("stop stays set");
            assert!(current >= last, "stop loosened from {last} to {current}");
            last = current;
        }
        // 130 * 0.95
        assert_eq!(last, dec!(123.5));
    }

    #[test]
    fn test_short_trailing_stop_only_falls() {
        let m = manager();
        let stop = m.update_trailing_stop(Direction::Short, dec!(100), Some(dec!(110)));
        assert_eq!(stop, Some(dec!(105)));
        let stop = m.update_trailing_stop(Direction::Short, dec!(120), stop);
        assert_eq!(stop, Some(dec!(105)));
    }

    #[test]
    fn test_disabled_trailing_keeps_stop() {
        let config = RiskConfig {
            trailing_stop: TrailingStopConfig {
                enabled: false,
                percent: dec!(0.05),
            },
            ..RiskConfig::default()
        };
        let m = StopLossManager::new(&config);
        assert_eq!(m.update_trailing_stop(Direction::Long, dec!(200), Some(dec!(90))), Some(dec!(90)));
        assert_eq!(m.update_trailing_stop(Direction::Long, dec!(200), None), None);
    }
}
