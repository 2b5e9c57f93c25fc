use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Longest stretch spent below a prior peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawdownPeriod {
    pub max_drawdown: Decimal,
    pub duration: Duration,
}

/// Tracks the capital peak and the decline from it
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    max_drawdown: Decimal,
    peak_capital: Decimal,
    current_capital: Decimal,
    history: VecDeque<(DateTime<Utc>, Decimal)>,
    history_limit: usize,
}

impl DrawdownMonitor {
    pub fn new(initial_capital: Decimal, max_drawdown: Decimal, history_limit: usize) -> Self {
        Self {
            max_drawdown,
            peak_capital: initial_capital.max(Decimal::ZERO),
            current_capital: initial_capital,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn update(&mut self, capital: Decimal, now: DateTime<Utc>) {
        self.current_capital = capital;
        if capital > self.peak_capital {
            self.peak_capital = capital;
        }

        let drawdown = self.calculate_drawdown();
        self.history.push_back((now, drawdown));
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// `(peak - current) / peak`, 0 when the peak is 0
    pub fn calculate_drawdown(&self) -> Decimal {
        if self.peak_capital <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.peak_capital - self.current_capital) / self.peak_capital
    }

    pub fn is_max_drawdown_exceeded(&self) -> bool {
        self.calculate_drawdown() > self.max_drawdown
    }

    /// Gain multiple needed to get back to the peak; `None` when fully drawn down
    pub fn recovery_factor(&self) -> Option<Decimal> {
        let drawdown = self.calculate_drawdown();
        if drawdown.is_zero() {
            return Some(Decimal::ONE);
        }
        if drawdown >= Decimal::ONE {
            return None;
        }
        Some(Decimal::ONE / (Decimal::ONE - drawdown))
    }

    /// Deepest recorded drawdown and the longest time spent under water
    pub fn max_drawdown_period(&self, now: DateTime<Utc>) -> DrawdownPeriod {
        let mut max_drawdown = Decimal::ZERO;
        let mut longest = Duration::zero();
        let mut started: Option<DateTime<Utc>> = None;

        for (timestamp, drawdown) in &self.history {
            if *drawdown > Decimal::ZERO {
                started.get_or_insert(*timestamp);
            } else if let Some(start) = started.take() {
                longest = longest.max(*timestamp - start);
            }
            max_drawdown = max_drawdown.max(*drawdown);
        }
        if let Some(start) = started {
            longest = longest.max(now - start);
        }

        DrawdownPeriod {
            max_drawdown,
            duration: longest,
        }
    }

    pub fn peak_capital(&self) -> Decimal {
        self.peak_capital
    }

    pub fn current_capital(&self) -> Decimal {
        self.current_capital
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_drawdown_zero_at_peak() {
        let mut monitor = DrawdownMonitor::new(dec!(10000), dec!(0.5), 1000);
        assert_eq!(monitor.calculate_drawdown(), Decimal::ZERO);

        monitor.update(dec!(12000), Utc::now());
        assert_eq!(monitor.calculate_drawdown(), Decimal::ZERO);

        monitor.update(dec!(9000), Utc::now());
        assert_eq!(monitor.calculate_drawdown(), dec!(0.25));
        assert_eq!(monitor.peak_capital(), dec!(12000));

        monitor.update(dec!(12000), Utc::now());
        assert_eq!(monitor.calculate_drawdown(), Decimal::ZERO);
    }

    #[test]
    fn test_zero_peak_clamps() {
        let mut monitor = DrawdownMonitor::new(Decimal::ZERO, dec!(0.5), 10);
        monitor.update(Decimal::ZERO, Utc::now());
        assert_eq!(monitor.calculate_drawdown(), Decimal::ZERO);
    }

    #[test]
    fn test_max_drawdown_and_recovery() {
        let mut monitor = DrawdownMonitor::new(dec!(10000), dec!(0.5), 10);
        monitor.update(dec!(7500), Utc::now());
        assert!(!monitor.is_max_drawdown_exceeded());
        assert_eq!(monitor.recovery_factor(), Some(dec!(1) / dec!(0.75)));

        monitor.update(dec!(4000), Utc::now());
        assert!(monitor.is_max_drawdown_exceeded());

        monitor.update(Decimal::ZERO, Utc::now());
        assert_eq!(monitor.recovery_factor(), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut monitor = DrawdownMonitor::new(dec!(100), dec!(0.5), 3);
        for i in 0..10 {
            monitor.update(Decimal::from(100 - i), Utc::now());
        }
        assert_eq!(monitor.history_len(), 3);
    }

    #[test]
    fn test_max_drawdown_period() {
        let start = Utc::now();
        let mut monitor = DrawdownMonitor::new(dec!(100), dec!(0.5), 100);
        monitor.update(dec!(90), start);
        monitor.update(dec!(80), start + Duration::hours(1));
        monitor.update(dec!(100), start + Duration::hours(3));
        monitor.update(dec!(95), start + Duration::hours(4));

        let period = monitor.max_drawdown_period(start + Duration::hours(5));
        assert_eq!(period.max_drawdown, dec!(0.2));
        assert_eq!(period.duration, Duration::hours(3));
    }
}
