//! Risk gate
//!
//! Every signal passes through `RiskManager::evaluate_signal` before it can
//! become an order. The gate stages run in a fixed order and the first
//! rejection wins:
//!
//! 1. circuit breaker
//! 2. drawdown limit
//! 3. position sizing
//! 4. exposure limit (skipped only for exits that reduce an open position)
//! 5. stop-loss price

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::domain::{Direction, Signal, SignalType};

use super::circuit_breaker::CircuitBreaker;
use super::drawdown::{DrawdownMonitor, DrawdownPeriod};
use super::exposure::{ExposureEntry, ExposureMonitor};
use super::sizing::PositionSizer;
use super::stop_loss::StopLossManager;

/// Outcome of the risk gate. `size` is a base-asset quantity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDecision {
    pub allowed: bool,
    pub size: Decimal,
    pub stop_price: Option<Decimal>,
    pub reason: Option<String>,
}

impl RiskDecision {
    pub fn allow(size: Decimal, stop_price: Option<Decimal>) -> Self {
        Self {
            allowed: true,
            size,
            stop_price,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            size: Decimal::ZERO,
            stop_price: None,
            reason: Some(reason.into()),
        }
    }
}

/// On-demand view for the monitoring surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSnapshot {
    pub total_exposure: Decimal,
    pub current_drawdown: Decimal,
    pub is_trading_allowed: bool,
    pub circuit_break_reason: Option<String>,
    pub position_count: usize,
    /// `None` when capital is fully drawn down
    pub recovery_factor: Option<Decimal>,
    pub max_drawdown_exceeded: bool,
    pub position_correlation: Decimal,
}

/// Process-wide risk counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskState {
    pub available_capital: Decimal,
    pub peak_capital: Decimal,
    pub daily_starting_capital: Decimal,
    pub weekly_starting_capital: Decimal,
    pub circuit_broken: bool,
    pub circuit_break_reason: Option<String>,
}

pub struct RiskManager {
    available_capital: Decimal,
    sizer: PositionSizer,
    stop_loss: StopLossManager,
    exposure: ExposureMonitor,
    drawdown: DrawdownMonitor,
    circuit_breaker: CircuitBreaker,
}

impl RiskManager {
    pub fn new(config: &RiskConfig, now: DateTime<Utc>) -> Self {
        let capital = config.initial_capital;
        Self {
            available_capital: capital,
            sizer: PositionSizer::new(config),
            stop_loss: StopLossManager::new(config),
            exposure: ExposureMonitor::new(config.max_exposure),
            drawdown: DrawdownMonitor::new(capital, config.max_drawdown, config.drawdown_history_limit),
            circuit_breaker: CircuitBreaker::new(&config.circuit_breakers, capital, now),
        }
    }

    /// Run the five-stage gate for one signal.
    pub fn evaluate_signal(&self, signal: &Signal, volatility: Decimal) -> RiskDecision {
        if !self.circuit_breaker.is_trading_allowed() {
            let reason = format!(
                "circuit breaker active: {}",
                self.circuit_breaker.reason().unwrap_or("unknown")
            );
            warn!("Signal {} rejected: {}", signal.id, reason);
            return RiskDecision::reject(reason);
        }

        if self.drawdown.is_max_drawdown_exceeded() {
            warn!(
                "Signal {} rejected: maximum drawdown exceeded ({})",
                signal.id,
                self.drawdown.calculate_drawdown().round_dp(4)
            );
            return RiskDecision::reject("maximum drawdown exceeded");
        }

        let Some(price) = signal.price.filter(|p| *p > Decimal::ZERO) else {
            warn!("Signal {} rejected: missing reference price", signal.id);
            return RiskDecision::reject("missing reference price");
        };

        let notional = self.sizer.calculate(self.available_capital, volatility);
        if notional <= Decimal::ZERO {
            warn!("Signal {} rejected: no capital available for sizing", signal.id);
            return RiskDecision::reject("position size is zero");
        }
        let mut size = notional / price;
        debug!(
            "Sized signal {} on {}: notional {} -> {} units (volatility {})",
            signal.id,
            signal.key(),
            notional.round_dp(2),
            size.round_dp(8),
            volatility
        );

        if let Some(open) = self.reducible_quantity(signal) {
            // Capped at the open quantity so the exit never flips into a new position.
            size = size.min(open);
            debug!(
                "Signal {} reduces open {} position, exposure check skipped",
                signal.id,
                signal.key()
            );
        } else if !self
            .exposure
            .is_new_position_allowed(notional, self.available_capital)
        {
            let projected = self
                .exposure
                .projected_exposure(notional, self.available_capital)
                .unwrap_or(Decimal::ZERO);
            warn!(
                "Signal {} rejected: exposure {} would exceed {}",
                signal.id,
                projected.round_dp(4),
                self.exposure.max_exposure()
            );
            return RiskDecision::reject("would exceed exposure limits");
        }

        let stop = self
            .stop_loss
            .calculate_stop_loss(price, signal.direction, volatility);
        info!(
            "Signal {} admitted: {} {} size {} stop {}",
            signal.id,
            signal.direction,
            signal.key(),
            size.round_dp(8),
            stop
        );
        RiskDecision::allow(size, Some(stop))
    }

    /// Open quantity an exit signal would close, if the exposure view holds a
    /// position on the same pair in the same direction.
    fn reducible_quantity(&self, signal: &Signal) -> Option<Decimal> {
        if signal.signal_type != SignalType::Exit {
            return None;
        }
        self.exposure
            .entry(&signal.key())
            .filter(|entry| entry.direction == signal.direction && entry.quantity > Decimal::ZERO)
            .map(|entry| entry.quantity)
    }

    /// Ratchet an open position's stop toward the current price.
    pub fn update_trailing_stop(
        &self,
        direction: Direction,
        current_price: Decimal,
        current_stop: Option<Decimal>,
    ) -> Option<Decimal> {
        let next = self
            .stop_loss
            .update_trailing_stop(direction, current_price, current_stop);
        if next != current_stop {
            debug!("Trailing stop {:?} -> {:?} at {}", current_stop, next, current_price);
        }
        next
    }

    /// Feed the latest total capital. Returns the circuit breaker reason if
    /// this update tripped it.
    pub fn update_account_status(&mut self, capital: Decimal, now: DateTime<Utc>) -> Option<String> {
        self.available_capital = capital;
        self.drawdown.update(capital, now);
        self.circuit_breaker.update_capital(capital, now)
    }

    /// Replace the exposure view with the ledger's open positions.
    pub fn sync_exposure(&mut self, entries: impl IntoIterator<Item = ExposureEntry>) {
        self.exposure.sync(entries);
    }

    pub fn reset_circuit(&mut self) {
        self.circuit_breaker.reset();
    }

    pub fn is_trading_allowed(&self) -> bool {
        self.circuit_breaker.is_trading_allowed()
    }

    pub fn available_capital(&self) -> Decimal {
        self.available_capital
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.drawdown.calculate_drawdown()
    }

    pub fn max_drawdown_period(&self, now: DateTime<Utc>) -> DrawdownPeriod {
        self.drawdown.max_drawdown_period(now)
    }

    pub fn exposure(&self) -> &ExposureMonitor {
        &self.exposure
    }

    pub fn snapshot(&self) -> RiskSnapshot {
        RiskSnapshot {
            total_exposure: self.exposure.total_exposure(self.available_capital),
            current_drawdown: self.drawdown.calculate_drawdown(),
            is_trading_allowed: self.circuit_breaker.is_trading_allowed(),
            circuit_break_reason: self.circuit_breaker.reason().map(str::to_string),
            position_count: self.exposure.position_count(),
            recovery_factor: self.drawdown.recovery_factor(),
            max_drawdown_exceeded: self.drawdown.is_max_drawdown_exceeded(),
            position_correlation: self.exposure.position_correlation(),
        }
    }

    pub fn state(&self) -> RiskState {
        RiskState {
            available_capital: self.available_capital,
            peak_capital: self.drawdown.peak_capital(),
            daily_starting_capital: self.circuit_breaker.daily_starting_capital(),
            weekly_starting_capital: self.circuit_breaker.weekly_starting_capital(),
            circuit_broken: self.circuit_breaker.is_broken(),
            circuit_break_reason: self.circuit_breaker.reason().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PairKey;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn signal(signal_type: SignalType, direction: Direction, price: Option<Decimal>) -> Signal {
        Signal::new(
            "test",
            "paper",
            "BTC/USDT",
            signal_type,
            direction,
            Decimal::ONE,
            price,
            dec!(1),
            Utc::now(),
            Duration::minutes(5),
        )
    }

    #[test]
    fn test_admitted_entry_is_sized_and_stopped() {
        let risk = RiskManager::new(&RiskConfig::default(), Utc::now());
        let decision = risk.evaluate_signal(
            &signal(SignalType::Entry, Direction::Long, Some(dec!(100))),
            dec!(0.05),
        );
        assert!(decision.allowed);
        // notional min(2000, 4000) / 100
        assert_eq!(decision.size, dec!(20));
        assert_eq!(decision.stop_price, Some(dec!(99.9)));
        assert!(decision.reason.is_none());
    }

    #[test]
    fn test_short_stop_is_above_entry() {
        let risk = RiskManager::new(&RiskConfig::default(), Utc::now());
        let decision = risk.evaluate_signal(
            &signal(SignalType::Entry, Direction::Short, Some(dec!(100))),
            dec!(0.05),
        );
        assert_eq!(decision.stop_price, Some(dec!(100.1)));
    }

    #[test]
    fn test_daily_loss_blocks_every_signal() {
        let start = Utc::now();
        let mut risk = RiskManager::new(&RiskConfig::default(), start);
        let reason = risk
            .update_account_status(dec!(9400), start)
            .expect("breaker trips");
        assert!(reason.contains("0.05"));

        for (ty, dir) in [
            (SignalType::Entry, Direction::Long),
            (SignalType::Exit, Direction::Short),
        ] {
            for vol in [Decimal::ZERO, dec!(0.01), dec!(5)] {
                let decision = risk.evaluate_signal(&signal(ty, dir, Some(dec!(100))), vol);
                assert!(!decision.allowed);
                assert_eq!(decision.size, Decimal::ZERO);
                assert_eq!(decision.stop_price, None);
            }
        }

        // Recovery alone does not re-enable trading
        risk.update_account_status(dec!(10000), start);
        assert!(!risk.is_trading_allowed());
        risk.reset_circuit();
        assert!(risk.is_trading_allowed());
    }

    #[test]
    fn test_drawdown_gate() {
        let config = RiskConfig {
            max_drawdown: dec!(0.1),
            circuit_breakers: crate::config::CircuitBreakerConfig {
                daily_loss_limit: dec!(0.9),
                weekly_loss_limit: dec!(0.9),
            },
            ..RiskConfig::default()
        };
        let mut risk = RiskManager::new(&config, Utc::now());
        risk.update_account_status(dec!(8500), Utc::now());
        let decision = risk.evaluate_signal(
            &signal(SignalType::Entry, Direction::Long, Some(dec!(100))),
            dec!(0.05),
        );
        assert_eq!(decision.reason.as_deref(), Some("maximum drawdown exceeded"));
    }

    #[test]
    fn test_missing_price_is_rejected() {
        let risk = RiskManager::new(&RiskConfig::default(), Utc::now());
        let decision =
            risk.evaluate_signal(&signal(SignalType::Entry, Direction::Long, None), dec!(0.05));
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("missing reference price"));
    }

    #[test]
    fn test_exposure_gate_applies_to_exits_without_a_position() {
        let mut risk = RiskManager::new(&RiskConfig::default(), Utc::now());
        risk.sync_exposure([ExposureEntry {
            key: PairKey::new("paper", "ETH/USDT"),
            direction: Direction::Long,
            quantity: dec!(2),
            current_price: dec!(2000),
        }]);
        // 0.4 open + 0.2 candidate > 0.5
        let entry = risk.evaluate_signal(
            &signal(SignalType::Entry, Direction::Long, Some(dec!(100))),
            dec!(0.05),
        );
        assert_eq!(entry.reason.as_deref(), Some("would exceed exposure limits"));

        // nothing open on BTC/USDT, so this exit would open a short
        let exit = risk.evaluate_signal(
            &signal(SignalType::Exit, Direction::Long, Some(dec!(100))),
            dec!(0.05),
        );
        assert!(!exit.allowed);
        assert_eq!(exit.size, Decimal::ZERO);
        assert_eq!(exit.reason.as_deref(), Some("would exceed exposure limits"));
    }

    #[test]
    fn test_reducing_exit_skips_gate_and_is_capped_at_open_quantity() {
        let mut risk = RiskManager::new(&RiskConfig::default(), Utc::now());
        risk.sync_exposure([
            ExposureEntry {
                key: PairKey::new("paper", "ETH/USDT"),
                direction: Direction::Long,
                quantity: dec!(2),
                current_price: dec!(2000),
            },
            ExposureEntry {
                key: PairKey::new("paper", "BTC/USDT"),
                direction: Direction::Long,
                quantity: dec!(3),
                current_price: dec!(100),
            },
        ]);

        let exit = risk.evaluate_signal(
            &signal(SignalType::Exit, Direction::Long, Some(dec!(100))),
            dec!(0.05),
        );
        assert!(exit.allowed);
        assert_eq!(exit.size, dec!(3));

        // opposite direction does not reduce the long
        let wrong_side = risk.evaluate_signal(
            &signal(SignalType::Exit, Direction::Short, Some(dec!(100))),
            dec!(0.05),
        );
        assert!(!wrong_side.allowed);
    }

    #[test]
    fn test_snapshot_and_state() {
        let now = Utc::now();
        let mut risk = RiskManager::new(&RiskConfig::default(), now);
        risk.update_account_status(dec!(12000), now);
        risk.update_account_status(dec!(11400), now);
        risk.sync_exposure([ExposureEntry {
            key: PairKey::new("paper", "BTC/USDT"),
            direction: Direction::Long,
            quantity: dec!(0.1),
            current_price: dec!(57000),
        }]);

        let snapshot = risk.snapshot();
        assert_eq!(snapshot.total_exposure, dec!(0.5));
        assert_eq!(snapshot.current_drawdown, dec!(0.05));
        assert_eq!(snapshot.position_count, 1);
        assert!(snapshot.is_trading_allowed);
        assert!(!snapshot.max_drawdown_exceeded);

        let state = risk.state();
        assert_eq!(state.available_capital, dec!(11400));
        assert_eq!(state.peak_capital, dec!(12000));
        assert_eq!(state.daily_starting_capital, dec!(10000));
        assert!(!state.circuit_broken);
    }
}
