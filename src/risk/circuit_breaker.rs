//! Loss-limit circuit breaker
//!
//! Compares capital against start-of-day and start-of-week baselines. Once
//! tripped it stays tripped until `reset` is called, even if capital recovers.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    daily_loss_limit: Decimal,
    weekly_loss_limit: Decimal,
    daily_starting_capital: Decimal,
    weekly_starting_capital: Decimal,
    last_daily_reset: DateTime<Utc>,
    last_weekly_reset: DateTime<Utc>,
    broken: bool,
    reason: Option<String>,
    broken_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, starting_capital: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            daily_loss_limit: config.daily_loss_limit,
            weekly_loss_limit: config.weekly_loss_limit,
            daily_starting_capital: starting_capital,
            weekly_starting_capital: starting_capital,
            last_daily_reset: now,
            last_weekly_reset: now,
            broken: false,
            reason: None,
            broken_at: None,
        }
    }

    /// Roll baselines over if a day/week has elapsed, then check both limits.
    /// Returns the reason when this update trips the breaker.
    pub fn update_capital(&mut self, capital: Decimal, now: DateTime<Utc>) -> Option<String> {
        if now - self.last_daily_reset >= Duration::days(1) {
            self.daily_starting_capital = capital;
            self.last_daily_reset = now;
            info!("Daily starting capital reset to {}", capital);
        }
        if now - self.last_weekly_reset >= Duration::days(7) {
            self.weekly_starting_capital = capital;
            self.last_weekly_reset = now;
            info!("Weekly starting capital reset to {}", capital);
        }

        if self.broken {
            return None;
        }

        let daily_loss = loss_fraction(self.daily_starting_capital, capital);
        if daily_loss > self.daily_loss_limit {
            return Some(self.trip(
                format!(
                    "Daily loss limit exceeded: {} > {}",
                    daily_loss.round_dp(4),
                    self.daily_loss_limit
                ),
                now,
            ));
        }

        let weekly_loss = loss_fraction(self.weekly_starting_capital, capital);
        if weekly_loss > self.weekly_loss_limit {
            return Some(self.trip(
                format!(
                    "Weekly loss limit exceeded: {} > {}",
                    weekly_loss.round_dp(4),
                    self.weekly_loss_limit
                ),
                now,
            ));
        }

        None
    }

    fn trip(&mut self, reason: String, now: DateTime<Utc>) -> String {
        warn!("Circuit breaker TRIPPED: {}", reason);
        self.broken = true;
        self.reason = Some(reason.clone());
        self.broken_at = Some(now);
        reason
    }

    /// Clear the trip. Baselines are left as they are.
    pub fn reset(&mut self) {
        if self.broken {
            info!(
                "Circuit breaker reset (was: {})",
                self.reason.as_deref().unwrap_or("unknown")
            );
        }
        self.broken = false;
        self.reason = None;
        self.broken_at = None;
    }

    pub fn is_trading_allowed(&self) -> bool {
        !self.broken
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn broken_at(&self) -> Option<DateTime<Utc>> {
        self.broken_at
    }

    pub fn daily_starting_capital(&self) -> Decimal {
        self.daily_starting_capital
    }

    pub fn weekly_starting_capital(&self) -> Decimal {
        self.weekly_starting_capital
    }
}

fn loss_fraction(start: Decimal, current: Decimal) -> Decimal {
    if start <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (start - current) / start
}
