//! Monitoring system
//!
//! Turns order transitions, position PnL and risk snapshots into alerts.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::MonitoringConfig;
use crate::domain::{Order, OrderStatus, PairKey, Position};
use crate::execution::Fill;
use crate::risk::RiskSnapshot;

use super::alert_manager::{Alert, AlertLevel, AlertManager};
use super::performance::{PerformanceMetrics, PerformanceMonitor};

/// Which side of the PnL alert band a position is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PnlZone {
    Loss,
    Neutral,
    Profit,
}

pub struct MonitoringSystem {
    config: MonitoringConfig,
    alerts: Arc<AlertManager>,
    performance: PerformanceMonitor,
    pnl_zones: HashMap<PairKey, PnlZone>,
}

impl MonitoringSystem {
    pub fn new(config: MonitoringConfig, alerts: Arc<AlertManager>, performance: PerformanceMonitor) -> Self {
        Self {
            config,
            alerts,
            performance,
            pnl_zones: HashMap::new(),
        }
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub async fn monitor_order(&self, order: &Order) {
        let (level, verb) = match order.status {
            OrderStatus::Filled => (AlertLevel::Info, "filled"),
            OrderStatus::Rejected => (AlertLevel::Error, "rejected"),
            OrderStatus::Canceled => (AlertLevel::Warning, "canceled"),
            _ => return,
        };
        let alert = Alert::new(
            level,
            "orders",
            &format!("Order {} {}", order.id, verb),
            &format!(
                "{} {} {} on {} ({} filled)",
                order.side, order.quantity, order.trading_pair, order.exchange, order.filled_quantity
            ),
        )
        .with_metadata(serde_json::json!({
            "order_id": order.id,
            "status": order.status.to_string(),
            "strategy_id": order.strategy_id,
        }));
        self.alerts.alert(alert).await;
    }

    /// Alert when a position's unrealized PnL crosses into or out of the
    /// `±pnl_alert_threshold` band. Staying in a zone raises nothing.
    pub async fn monitor_position(&mut self, position: &Position, current_price: Decimal) {
        let basis = position.cost_basis();
        if basis <= Decimal::ZERO {
            return;
        }
        let ratio = position.pnl_at(current_price) / basis;
        let threshold = self.config.pnl_alert_threshold;
        let zone = if ratio >= threshold {
            PnlZone::Profit
        } else if ratio <= -threshold {
            PnlZone::Loss
        } else {
            PnlZone::Neutral
        };

        let key = position.key();
        let previous = self.pnl_zones.insert(key.clone(), zone).unwrap_or(PnlZone::Neutral);
        if previous == zone || zone == PnlZone::Neutral {
            return;
        }

        let percent = (ratio * Decimal::ONE_HUNDRED).round_dp(2);
        match zone {
            PnlZone::Profit => {
                self.alerts
                    .info("positions", &format!("{} profit", key), &format!("{} is up {}%", key, percent))
                    .await;
            }
            PnlZone::Loss => {
                self.alerts
                    .warning("positions", &format!("{} loss", key), &format!("{} is down {}%", key, percent.abs()))
                    .await;
            }
            PnlZone::Neutral => {}
        }
    }

    /// Drop PnL tracking for positions that are no longer open
    pub fn retain_positions<'a>(&mut self, open: impl IntoIterator<Item = &'a PairKey>) {
        let open: std::collections::HashSet<&PairKey> = open.into_iter().collect();
        self.pnl_zones.retain(|key, _| open.contains(key));
    }

    pub async fn monitor_risk(&self, snapshot: &RiskSnapshot) {
        if snapshot.total_exposure > self.config.exposure_alert_threshold {
            self.alerts
                .warning(
                    "risk",
                    "High exposure",
                    &format!(
                        "{}% of capital is exposed",
                        (snapshot.total_exposure * Decimal::ONE_HUNDRED).round_dp(2)
                    ),
                )
                .await;
        }
        if snapshot.current_drawdown > self.config.drawdown_alert_threshold {
            self.alerts
                .warning(
                    "risk",
                    "High drawdown",
                    &format!(
                        "{}% from peak",
                        (snapshot.current_drawdown * Decimal::ONE_HUNDRED).round_dp(2)
                    ),
                )
                .await;
        }
        if !snapshot.is_trading_allowed {
            self.alerts
                .error(
                    "risk",
                    "Circuit breaker active",
                    snapshot.circuit_break_reason.as_deref().unwrap_or("unknown"),
                )
                .await;
        }
    }

    pub fn record_fill(&mut self, fill: &Fill) {
        self.performance.record_fill(fill);
    }

    pub fn update_balance(&mut self, balance: Decimal) {
        self.performance.update_balance(balance);
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    pub fn log_summary(&self) -> PerformanceMetrics {
        let metrics = self.performance.metrics();
        info!(
            "Performance: balance {} | PnL {} ({}%) | win rate {}% | drawdown {}%",
            metrics.current_balance.round_dp(2),
            metrics.total_pnl.round_dp(2),
            metrics.pnl_percent.round_dp(2),
            (metrics.win_rate * Decimal::ONE_HUNDRED).round_dp(2),
            (metrics.max_drawdown * Decimal::ONE_HUNDRED).round_dp(2)
        );
        info!(
            "Closed trades: avg win {} | avg loss {} | profit factor {}",
            metrics.average_win.round_dp(2),
            metrics.average_loss.round_dp(2),
            metrics
                .profit_factor
                .map(|pf| pf.round_dp(2).to_string())
                .unwrap_or_else(|| "n/a".to_string())
        );
        if let Some((day, pnl)) = self.performance.daily_pnl().iter().next_back() {
            info!("Realized PnL for {}: {}", day, pnl.round_dp(2));
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, OrderRequest, OrderSide};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn system() -> MonitoringSystem {
        let config = MonitoringConfig::default();
        let alerts = Arc::new(AlertManager::new(&config));
        MonitoringSystem::new(config, alerts, PerformanceMonitor::new(dec!(10000), Utc::now()))
    }

    #[tokio::test]
    async fn test_order_alert_levels() {
        let monitor = system();
        let request = OrderRequest::market("paper", "BTC/USDT", OrderSide::Buy, dec!(1));
        let mut order = Order::from_request(&request, Utc::now());

        monitor.monitor_order(&order).await;
        assert_eq!(monitor.alerts().history_len().await, 0);

        order.set_status(OrderStatus::Rejected, Utc::now());
        monitor.monitor_order(&order).await;
        let recent = monitor.alerts().recent(1, AlertLevel::Info).await;
        assert_eq!(recent[0].level, AlertLevel::Error);
        assert!(recent[0].title.ends_with("rejected"));
    }

    #[tokio::test]
    async fn test_pnl_alerts_fire_on_crossing_only() {
        let mut monitor = system();
        let position = Position::open(
            &PairKey::new("paper", "BTC/USDT"),
            Direction::Long,
            dec!(100),
            dec!(1),
            None,
            Utc::now(),
        );

        monitor.monitor_position(&position, dec!(105)).await;
        assert_eq!(monitor.alerts().history_len().await, 0);

        monitor.monitor_position(&position, dec!(110)).await;
        monitor.monitor_position(&position, dec!(120)).await;
        assert_eq!(monitor.alerts().history_len().await, 1);

        monitor.monitor_position(&position, dec!(89)).await;
        let recent = monitor.alerts().recent(1, AlertLevel::Info).await;
        assert_eq!(recent[0].level, AlertLevel::Warning);
        assert!(recent[0].message.contains("down 11"));
        assert_eq!(monitor.alerts().history_len().await, 2);
    }

    #[tokio::test]
    async fn test_risk_alerts() {
        let monitor = system();
        let snapshot = RiskSnapshot {
            total_exposure: dec!(0.45),
            current_drawdown: dec!(0.1),
            is_trading_allowed: false,
            circuit_break_reason: Some("Daily loss limit exceeded: 0.0600 > 0.05".to_string()),
            position_count: 2,
            recovery_factor: Some(dec!(1.1)),
            max_drawdown_exceeded: false,
            position_correlation: Decimal::ZERO,
        };
        monitor.monitor_risk(&snapshot).await;

        let recent = monitor.alerts().recent(10, AlertLevel::Info).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].title, "Circuit breaker active");
        assert_eq!(recent[1].title, "High exposure");
    }
}
