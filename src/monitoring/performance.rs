use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::execution::{Fill, FillOutcome};

/// Per-strategy results from reconciled fills
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyPerformance {
    pub total_trades: u64,
    pub closing_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    /// Sum of winning results
    pub gross_profit: Decimal,
    /// Sum of losing results, as a positive amount
    pub gross_loss: Decimal,
}

impl StrategyPerformance {
    pub fn win_rate(&self) -> Decimal {
        if self.closing_trades == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades) / Decimal::from(self.closing_trades)
    }

    pub fn average_win(&self) -> Decimal {
        if self.winning_trades == 0 {
            return Decimal::ZERO;
        }
        self.gross_profit / Decimal::from(self.winning_trades)
    }

    /// Mean losing result as a positive amount
    pub fn average_loss(&self) -> Decimal {
        if self.losing_trades == 0 {
            return Decimal::ZERO;
        }
        self.gross_loss / Decimal::from(self.losing_trades)
    }

    /// Gross profit over gross loss; `None` until a loss has been booked
    pub fn profit_factor(&self) -> Option<Decimal> {
        if self.gross_loss.is_zero() {
            return None;
        }
        Some(self.gross_profit / self.gross_loss)
    }

    fn record(&mut self, realized: Option<Decimal>, fee: Decimal) {
        self.total_trades += 1;
        self.fees += fee;
        let Some(pnl) = realized else {
            return;
        };
        self.closing_trades += 1;
        self.realized_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_profit += pnl;
            self.largest_win = self.largest_win.max(pnl);
        } else if pnl < Decimal::ZERO {
            self.losing_trades += 1;
            self.gross_loss -= pnl;
            self.largest_loss = self.largest_loss.min(pnl);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub start_time: DateTime<Utc>,
    pub starting_balance: Decimal,
    pub current_balance: Decimal,
    pub peak_balance: Decimal,
    pub lowest_balance: Decimal,
    pub total_pnl: Decimal,
    /// Percent of starting balance
    pub pnl_percent: Decimal,
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: Decimal,
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub profit_factor: Option<Decimal>,
    pub realized_pnl: Decimal,
    /// Deepest fall from a running peak, as a fraction of that peak
    pub max_drawdown: Decimal,
}

/// Balance and trade statistics for the whole session
#[derive(Debug, Clone)]
pub struct PerformanceMonitor {
    start_time: DateTime<Utc>,
    starting_balance: Decimal,
    current_balance: Decimal,
    peak_balance: Decimal,
    lowest_balance: Decimal,
    max_drawdown: Decimal,
    overall: StrategyPerformance,
    by_strategy: HashMap<String, StrategyPerformance>,
    daily_pnl: BTreeMap<NaiveDate, Decimal>,
}

impl PerformanceMonitor {
    pub fn new(starting_balance: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            start_time: now,
            starting_balance,
            current_balance: starting_balance,
            peak_balance: starting_balance,
            lowest_balance: starting_balance,
            max_drawdown: Decimal::ZERO,
            overall: StrategyPerformance::default(),
            by_strategy: HashMap::new(),
            daily_pnl: BTreeMap::new(),
        }
    }

    pub fn update_balance(&mut self, balance: Decimal) {
        self.current_balance = balance;
        self.peak_balance = self.peak_balance.max(balance);
        self.lowest_balance = self.lowest_balance.min(balance);
        if self.peak_balance > Decimal::ZERO {
            let drawdown = (self.peak_balance - balance) / self.peak_balance;
            self.max_drawdown = self.max_drawdown.max(drawdown);
        }
    }

    /// Count a fill. Only fills that reduce or close a position have a result.
    pub fn record_fill(&mut self, fill: &Fill) {
        let realized = match fill.outcome {
            FillOutcome::Reduced { realized } | FillOutcome::Closed { realized } => Some(realized),
            _ => None,
        };
        self.overall.record(realized, fill.trade.fee);
        if let Some(pnl) = realized {
            *self
                .daily_pnl
                .entry(fill.trade.timestamp.date_naive())
                .or_insert(Decimal::ZERO) += pnl;
        }
        if let Some(strategy_id) = &fill.trade.strategy_id {
            self.by_strategy
                .entry(strategy_id.clone())
                .or_default()
                .record(realized, fill.trade.fee);
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let total_pnl = self.current_balance - self.starting_balance;
        let pnl_percent = if self.starting_balance > Decimal::ZERO {
            total_pnl / self.starting_balance * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        PerformanceMetrics {
            start_time: self.start_time,
            starting_balance: self.starting_balance,
            current_balance: self.current_balance,
            peak_balance: self.peak_balance,
            lowest_balance: self.lowest_balance,
            total_pnl,
            pnl_percent,
            total_trades: self.overall.total_trades,
            winning_trades: self.overall.winning_trades,
            losing_trades: self.overall.losing_trades,
            win_rate: self.overall.win_rate(),
            average_win: self.overall.average_win(),
            average_loss: self.overall.average_loss(),
            profit_factor: self.overall.profit_factor(),
            realized_pnl: self.overall.realized_pnl,
            max_drawdown: self.max_drawdown,
        }
    }

    /// Realized PnL per UTC calendar day, oldest first
    pub fn daily_pnl(&self) -> &BTreeMap<NaiveDate, Decimal> {
        &self.daily_pnl
    }

    pub fn strategy(&self, strategy_id: &str) -> StrategyPerformance {
        self.by_strategy
            .get(strategy_id)
            .cloned()
            .unwrap_or_default()
    }
}
