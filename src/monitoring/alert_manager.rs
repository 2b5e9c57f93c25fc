//! Alert Manager
//!
//! Logs every alert at its level, keeps a bounded history, and broadcasts to
//! subscribers. Repeats of the same alert key within the rate-limit window are
//! suppressed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitoringConfig;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert payload
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub component: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, component: &str, title: &str, message: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            level,
            component: component.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn rate_limit_key(&self) -> String {
        format!("{}:{}:{}", self.component, self.level, self.title)
    }
}

#[derive(Debug)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

pub struct AlertManager {
    rate_limit_secs: i64,
    history_limit: usize,
    rate_limits: RwLock<HashMap<String, RateLimitState>>,
    history: RwLock<VecDeque<Alert>>,
    event_tx: broadcast::Sender<Alert>,
}

impl AlertManager {
    pub fn new(config: &MonitoringConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            rate_limit_secs: i64::try_from(config.rate_limit_secs).unwrap_or(i64::MAX),
            history_limit: config.alert_history_limit.max(1),
            rate_limits: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.event_tx.subscribe()
    }

    async fn should_rate_limit(&self, alert: &Alert) -> bool {
        let key = alert.rate_limit_key();
        let mut limits = self.rate_limits.write().await;
        // Keys whose window has passed carry no state worth keeping.
        let window = self.rate_limit_secs;
        limits.retain(|_, state| {
            alert.timestamp.signed_duration_since(state.last_sent).num_seconds() < window
        });

        if let Some(state) = limits.get_mut(&key) {
            let elapsed = alert
                .timestamp
                .signed_duration_since(state.last_sent)
                .num_seconds();
            if elapsed < self.rate_limit_secs {
                state.suppressed_count += 1;
                debug!(
                    "Rate limiting alert '{}' ({} suppressed)",
                    alert.title, state.suppressed_count
                );
                return true;
            }
            state.last_sent = alert.timestamp;
            state.suppressed_count = 0;
        } else {
            limits.insert(
                key,
                RateLimitState {
                    last_sent: alert.timestamp,
                    suppressed_count: 0,
                },
            );
        }
        false
    }

    /// Record and broadcast an alert. Returns false if it was rate limited.
    pub async fn alert(&self, alert: Alert) -> bool {
        if self.should_rate_limit(&alert).await {
            return false;
        }

        match alert.level {
            AlertLevel::Info => info!("[{}] {}: {}", alert.component, alert.title, alert.message),
            AlertLevel::Warning => {
                warn!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
            AlertLevel::Error => {
                error!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
            AlertLevel::Critical => error!(
                "CRITICAL [{}] {}: {}",
                alert.component, alert.title, alert.message
            ),
        }

        {
            let mut history = self.history.write().await;
            history.push_back(alert.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }

        let _ = self.event_tx.send(alert);
        true
    }

    pub async fn info(&self, component: &str, title: &str, message: &str) -> bool {
        self.alert(Alert::new(AlertLevel::Info, component, title, message))
            .await
    }

    pub async fn warning(&self, component: &str, title: &str, message: &str) -> bool {
        self.alert(Alert::new(AlertLevel::Warning, component, title, message))
            .await
    }

    pub async fn error(&self, component: &str, title: &str, message: &str) -> bool {
        self.alert(Alert::new(AlertLevel::Error, component, title, message))
            .await
    }

    pub async fn critical(&self, component: &str, title: &str, message: &str) -> bool {
        self.alert(Alert::new(AlertLevel::Critical, component, title, message))
            .await
    }

    /// Most recent alerts at or above `min_level`, newest first
    pub async fn recent(&self, limit: usize, min_level: AlertLevel) -> Vec<Alert> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .filter(|a| a.level >= min_level)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }
}
