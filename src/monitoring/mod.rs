//! Alerts, position/risk monitoring and performance statistics

mod alert_manager;
mod monitor;
mod performance;

pub use alert_manager::{Alert, AlertLevel, AlertManager};
pub use monitor::MonitoringSystem;
pub use performance::{PerformanceMetrics, PerformanceMonitor, StrategyPerformance};
