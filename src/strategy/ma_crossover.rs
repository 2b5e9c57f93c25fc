//! Moving-average crossover strategy
//!
//! Emits an ENTRY when the short SMA crosses the long SMA between two
//! consecutive price points: bullish when `prev_short <= prev_long` and
//! `short > long`, bearish when `prev_short >= prev_long` and `short < long`.
//! An exact tie on the current point is a no-trade zone.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

use crate::config::MaCrossoverConfig;
use crate::domain::{Direction, PairKey, Signal, SignalType, Ticker};

use super::traits::{OpenPositions, Strategy, StrategyStatus};
use super::volatility::returns_volatility;

/// Short and long SMA at two consecutive points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverState {
    pub prev_short: Decimal,
    pub prev_long: Decimal,
    pub short: Decimal,
    pub long: Decimal,
}

impl CrossoverState {
    pub fn crossover(&self) -> Option<Direction> {
        if self.prev_short <= self.prev_long && self.short > self.long {
            Some(Direction::Long)
        } else if self.prev_short >= self.prev_long && self.short < self.long {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

fn sma(window: impl Iterator<Item = Decimal>, len: usize) -> Decimal {
    window.sum::<Decimal>() / Decimal::from(len)
}

pub struct MaCrossoverStrategy {
    config: MaCrossoverConfig,
    status: StrategyStatus,
    history: HashMap<PairKey, VecDeque<Decimal>>,
    max_history: usize,
}

impl MaCrossoverStrategy {
    pub fn new(config: MaCrossoverConfig) -> Self {
        let max_history = config.short_window.max(config.long_window) + config.history_margin;
        Self {
            config,
            status: StrategyStatus::Active,
            history: HashMap::new(),
            max_history,
        }
    }

    pub fn history(&self, key: &PairKey) -> Option<&VecDeque<Decimal>> {
        self.history.get(key)
    }

    /// Moving averages at the last two points, if history covers both
    pub fn crossover_state(&self, key: &PairKey) -> Option<CrossoverState> {
        let prices = self.history.get(key)?;
        let (short_w, long_w) = (self.config.short_window, self.config.long_window);
        let len = prices.len();
        if short_w == 0 || long_w == 0 || len < short_w.max(long_w) + 1 {
            return None;
        }

        let trailing = |window: usize, end: usize| sma(prices.range(end - window..end).copied(), window);

        Some(CrossoverState {
            prev_short: trailing(short_w, len - 1),
            prev_long: trailing(long_w, len - 1),
            short: trailing(short_w, len),
            long: trailing(long_w, len),
        })
    }

    fn record_price(&mut self, key: &PairKey, price: Decimal) {
        let prices = self.history.entry(key.clone()).or_default();
        prices.push_back(price);
        while prices.len() > self.max_history {
            prices.pop_front();
        }
    }

    /// Quantity sized from reference capital and recent volatility; zero when
    /// volatility is unavailable
    fn signal_quantity(&self, key: &PairKey, price: Decimal) -> Decimal {
        let Some(prices) = self.history.get(key) else {
            return Decimal::ZERO;
        };
        let series: Vec<Decimal> = prices.iter().copied().collect();
        match returns_volatility(&series) {
            Some(vol) if vol > Decimal::ZERO && price > Decimal::ZERO => {
                self.config.reference_capital * self.config.risk_per_trade / vol / price
            }
            _ => Decimal::ZERO,
        }
    }
}

impl Strategy for MaCrossoverStrategy {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn target_exchanges(&self) -> &[String] {
        &self.config.target_exchanges
    }

    fn target_pairs(&self) -> &[String] {
        &self.config.target_pairs
    }

    fn status(&self) -> StrategyStatus {
        self.status
    }

    fn set_status(&mut self, status: StrategyStatus) {
        self.status = status;
    }

    fn on_market_data(
        &mut self,
        ticker: &Ticker,
        open_positions: &OpenPositions,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let key = ticker.key();
        let price = ticker.close;
        self.record_price(&key, price);

        let Some(state) = self.crossover_state(&key) else {
            return Vec::new();
        };
        let Some(direction) = state.crossover() else {
            return Vec::new();
        };

        if open_positions.get(&key) == Some(&direction) {
            debug!(
                "[{}] {} crossover on {} ignored: position already open",
                self.config.id, direction, key
            );
            return Vec::new();
        }

        let quantity = self.signal_quantity(&key, price);
        if quantity <= Decimal::ZERO {
            debug!("[{}] no volatility estimate for {}, skipping", self.config.id, key);
            return Vec::new();
        }

        let crossover_type = match direction {
            Direction::Long => "bullish",
            Direction::Short => "bearish",
        };
        info!(
            "[{}] {} crossover on {}: short {} long {}",
            self.config.id,
            crossover_type,
            key,
            state.short.round_dp(4),
            state.long.round_dp(4)
        );

        let signal = Signal::new(
            &self.config.id,
            &ticker.exchange,
            &ticker.trading_pair,
            SignalType::Entry,
            direction,
            Decimal::ONE,
            Some(price),
            quantity,
            now,
            Duration::seconds(self.config.signal_ttl_secs),
        )
        .with_metadata("crossover_type", crossover_type)
        .with_metadata("short_ma", state.short.round_dp(8).to_string())
        .with_metadata("long_ma", state.long.round_dp(8).to_string());

        vec![signal]
    }
}
