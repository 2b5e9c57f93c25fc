use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::domain::{OrderType, TradingPair};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Orders go to the simulated venue
    Paper,
    /// Orders go to real venues
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub mode: TradingMode,
    /// Main control loop period
    pub cycle_interval_secs: u64,
    /// Ticker polling period per exchange
    pub market_data_interval_secs: u64,
    pub monitoring_interval_secs: u64,
    pub tick_channel_capacity: usize,
    pub signal_queue_capacity: usize,
    /// Candle interval used for volatility estimates (e.g. "1d")
    pub volatility_interval: String,
    pub volatility_lookback: usize,
    /// Volatility used when history cannot be fetched
    pub default_volatility: Decimal,
    /// Lifetime of exit signals raised by stop-loss triggers
    pub stop_loss_exit_ttl_secs: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            cycle_interval_secs: 60,
            market_data_interval_secs: 10,
            monitoring_interval_secs: 60,
            tick_channel_capacity: 1024,
            signal_queue_capacity: 256,
            volatility_interval: "1d".to_string(),
            volatility_lookback: 30,
            default_volatility: dec!(0.02),
            stop_loss_exit_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketDataSource {
    /// Public Binance REST endpoints
    Binance,
    /// In-process quotes (tests and replays)
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub source: MarketDataSource,
    pub rest_url: String,
    pub request_timeout_ms: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            source: MarketDataSource::Binance,
            rest_url: "https://api.binance.com".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Starting capital in quote currency
    pub initial_capital: Decimal,
    /// Largest position as a fraction of capital (e.g. 0.2 = 20%)
    pub max_position_size: Decimal,
    /// Capital at risk per trade, scaled by volatility
    pub risk_per_trade: Decimal,
    pub volatility_scaling: bool,
    /// Total notional exposure as a fraction of capital
    pub max_exposure: Decimal,
    /// Drawdown from peak that blocks new signals
    pub max_drawdown: Decimal,
    /// Stop distance in volatility units
    pub risk_multiplier: Decimal,
    pub trailing_stop: TrailingStopConfig,
    pub circuit_breakers: CircuitBreakerConfig,
    pub drawdown_history_limit: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(10000),
            max_position_size: dec!(0.2),
            risk_per_trade: dec!(0.02),
            volatility_scaling: true,
            max_exposure: dec!(0.5),
            max_drawdown: dec!(0.5),
            risk_multiplier: dec!(2.0),
            trailing_stop: TrailingStopConfig::default(),
            circuit_breakers: CircuitBreakerConfig::default(),
            drawdown_history_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingStopConfig {
    pub enabled: bool,
    /// Distance from the current price (e.g. 0.05 = 5%)
    pub percent: Decimal,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percent: dec!(0.05),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Loss from start-of-day capital that trips the breaker
    pub daily_loss_limit: Decimal,
    /// Loss from start-of-week capital that trips the breaker
    pub weekly_loss_limit: Decimal,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: dec!(0.05),
            weekly_loss_limit: dec!(0.15),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// "market" or "limit"
    pub default_order_type: String,
    /// Default length of order history queries
    pub order_history_limit: usize,
}

impl ExecutionConfig {
    pub fn order_type(&self) -> Result<OrderType, String> {
        self.default_order_type.parse()
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_order_type: "market".to_string(),
            order_history_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub name: String,
    pub trading_pairs: Vec<String>,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    /// Adverse price move applied to simulated market fills
    pub slippage: Decimal,
    pub initial_balances: HashMap<String, Decimal>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: "binance".to_string(),
            trading_pairs: vec!["BTC/USDT".to_string()],
            maker_fee: dec!(0.001),
            taker_fee: dec!(0.001),
            slippage: dec!(0.001),
            initial_balances: HashMap::from([("USDT".to_string(), dec!(10000))]),
        }
    }
}

fn default_exchanges() -> Vec<ExchangeConfig> {
    vec![ExchangeConfig::default()]
}

/// Strategy instance configuration, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    MaCrossover(MaCrossoverConfig),
    Arbitrage(ArbitrageConfig),
}

impl StrategyConfig {
    pub fn id(&self) -> &str {
        match self {
            Self::MaCrossover(c) => &c.id,
            Self::Arbitrage(c) => &c.id,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            Self::MaCrossover(c) => c.enabled,
            Self::Arbitrage(c) => c.enabled,
        }
    }

    pub fn target_exchanges(&self) -> &[String] {
        match self {
            Self::MaCrossover(c) => &c.target_exchanges,
            Self::Arbitrage(c) => &c.target_exchanges,
        }
    }

    pub fn target_pairs(&self) -> &[String] {
        match self {
            Self::MaCrossover(c) => &c.target_pairs,
            Self::Arbitrage(c) => &c.target_pairs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaCrossoverConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub target_exchanges: Vec<String>,
    pub target_pairs: Vec<String>,
    pub short_window: usize,
    pub long_window: usize,
    /// Extra history kept beyond the longest window
    pub history_margin: usize,
    pub risk_per_trade: Decimal,
    /// Capital used to size signals before the risk gate
    pub reference_capital: Decimal,
    pub signal_ttl_secs: i64,
}

impl Default for MaCrossoverConfig {
    fn default() -> Self {
        Self {
            id: "ma_crossover".to_string(),
            name: "Moving Average Crossover".to_string(),
            enabled: true,
            target_exchanges: Vec::new(),
            target_pairs: Vec::new(),
            short_window: 50,
            long_window: 200,
            history_margin: 10,
            risk_per_trade: dec!(0.02),
            reference_capital: dec!(10000),
            signal_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub target_exchanges: Vec<String>,
    pub target_pairs: Vec<String>,
    /// Net spread required after fees (e.g. 0.005 = 0.5%)
    pub min_profit_threshold: Decimal,
    pub max_position_size: Decimal,
    /// Lifetime of the paired signals
    pub execution_window_secs: i64,
    pub default_fee_rate: Decimal,
    /// Per-venue fee overrides
    pub fee_rates: HashMap<String, Decimal>,
    pub reference_capital: Decimal,
}

impl ArbitrageConfig {
    pub fn fee_rate(&self, exchange: &str) -> Decimal {
        self.fee_rates
            .get(exchange)
            .copied()
            .unwrap_or(self.default_fee_rate)
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            id: "arbitrage".to_string(),
            name: "Cross-Venue Arbitrage".to_string(),
            enabled: true,
            target_exchanges: Vec::new(),
            target_pairs: Vec::new(),
            min_profit_threshold: dec!(0.01),
            max_position_size: dec!(0.1),
            execution_window_secs: 5,
            default_fee_rate: dec!(0.001),
            fee_rates: HashMap::new(),
            reference_capital: dec!(10000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Unrealized PnL fraction that raises a position alert
    pub pnl_alert_threshold: Decimal,
    pub exposure_alert_threshold: Decimal,
    pub drawdown_alert_threshold: Decimal,
    pub alert_history_limit: usize,
    /// Minimum interval between duplicate alerts
    pub rate_limit_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            pnl_alert_threshold: dec!(0.10),
            exposure_alert_threshold: dec!(0.4),
            drawdown_alert_threshold: dec!(0.2),
            alert_history_limit: 500,
            rate_limit_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("trading.mode", "paper")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CRYPTRADE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // CRYPTRADE_RISK__MAX_EXPOSURE, CRYPTRADE_TRADING__CYCLE_INTERVAL_SECS, ...
            .add_source(
                Environment::with_prefix("CRYPTRADE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Paper-trading configuration with one MA crossover strategy
    pub fn default_config() -> Self {
        Self {
            trading: TradingConfig::default(),
            market_data: MarketDataConfig::default(),
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            exchanges: default_exchanges(),
            strategies: vec![StrategyConfig::MaCrossover(MaCrossoverConfig {
                target_pairs: vec!["BTC/USDT".to_string()],
                ..MaCrossoverConfig::default()
            })],
            monitoring: MonitoringConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.mode == TradingMode::Live {
            errors.push("live trading mode is not supported; use mode = \"paper\"".to_string());
        }
        if self.trading.cycle_interval_secs == 0 || self.trading.market_data_interval_secs == 0 {
            errors.push("cycle and market data intervals must be positive".to_string());
        }
        if self.trading.tick_channel_capacity == 0 || self.trading.signal_queue_capacity == 0 {
            errors.push("channel capacities must be positive".to_string());
        }
        if self.trading.default_volatility < Decimal::ZERO {
            errors.push("default_volatility must not be negative".to_string());
        }

        // Risk params
        let risk = &self.risk;
        if risk.initial_capital <= Decimal::ZERO {
            errors.push("initial_capital must be positive".to_string());
        }
        for (name, value) in [
            ("max_position_size", risk.max_position_size),
            ("risk_per_trade", risk.risk_per_trade),
            ("max_exposure", risk.max_exposure),
            ("max_drawdown", risk.max_drawdown),
            ("trailing_stop.percent", risk.trailing_stop.percent),
            ("circuit_breakers.daily_loss_limit", risk.circuit_breakers.daily_loss_limit),
            ("circuit_breakers.weekly_loss_limit", risk.circuit_breakers.weekly_loss_limit),
        ] {
            if !is_fraction(value) {
                errors.push(format!("{name} must be in (0, 1], got {value}"));
            }
        }
        if risk.risk_multiplier < Decimal::ZERO {
            errors.push("risk_multiplier must not be negative".to_string());
        }

        if let Err(e) = self.execution.order_type() {
            errors.push(format!("execution.default_order_type: {e}"));
        }

        // Exchanges
        let mut names = HashSet::new();
        for exchange in &self.exchanges {
            if exchange.name.trim().is_empty() {
                errors.push("exchange name must not be empty".to_string());
            } else if !names.insert(exchange.name.as_str()) {
                errors.push(format!("duplicate exchange '{}'", exchange.name));
            }
            for pair in &exchange.trading_pairs {
                if TradingPair::parse(pair).is_err() {
                    errors.push(format!("exchange '{}': invalid pair '{}'", exchange.name, pair));
                }
            }
            if exchange.slippage < Decimal::ZERO || exchange.slippage >= Decimal::ONE {
                errors.push(format!("exchange '{}': slippage must be in [0, 1)", exchange.name));
            }
        }

        // Strategies
        let mut ids = HashSet::new();
        for strategy in &self.strategies {
            if strategy.id().trim().is_empty() {
                errors.push("strategy id must not be empty".to_string());
            } else if !ids.insert(strategy.id()) {
                errors.push(format!("duplicate strategy id '{}'", strategy.id()));
            }
            for target in strategy.target_exchanges() {
                if !names.contains(target.as_str()) {
                    errors.push(format!(
                        "strategy '{}' targets unknown exchange '{}'",
                        strategy.id(),
                        target
                    ));
                }
            }
            match strategy {
                StrategyConfig::MaCrossover(c) => {
                    if c.short_window == 0 || c.long_window == 0 {
                        errors.push(format!("strategy '{}': windows must be >= 1", c.id));
                    }
                    if c.short_window >= c.long_window {
                        errors.push(format!(
                            "strategy '{}': short_window must be less than long_window",
                            c.id
                        ));
                    }
                }
                StrategyConfig::Arbitrage(c) => {
                    if c.min_profit_threshold < Decimal::ZERO {
                        errors.push(format!(
                            "strategy '{}': min_profit_threshold must not be negative",
                            c.id
                        ));
                    }
                    if !is_fraction(c.max_position_size) {
                        errors.push(format!(
                            "strategy '{}': max_position_size must be in (0, 1]",
                            c.id
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_fraction(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk.circuit_breakers.daily_loss_limit, dec!(0.05));
        assert_eq!(config.trading.cycle_interval_secs, 60);
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = AppConfig::default_config();
        config.trading.mode = TradingMode::Live;
        config.risk.max_exposure = dec!(1.5);
        config.strategies = vec![StrategyConfig::MaCrossover(MaCrossoverConfig {
            short_window: 10,
            long_window: 5,
            target_exchanges: vec!["kraken".to_string()],
            ..MaCrossoverConfig::default()
        })];

        let errors = config.validate().expect_err("config should be invalid");
        assert!(errors.iter().any(|e| e.contains("live")));
        assert!(errors.iter().any(|e| e.contains("max_exposure")));
        assert!(errors.iter().any(|e| e.contains("short_window")));
        assert!(errors.iter().any(|e| e.contains("kraken")));
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut file = std::fs::File::create(dir.path().join("default.toml")).expect("create");
        writeln!(
            file,
            r#"
[trading]
cycle_interval_secs = 30

[risk]
initial_capital = 5000
max_exposure = 0.4

[[exchanges]]
name = "venue_a"
trading_pairs = ["ETH/USDT"]

[[strategies]]
type = "arbitrage"
id = "arb-eth"
target_pairs = ["ETH/USDT"]
min_profit_threshold = 0.005

[strategies.fee_rates]
venue_a = 0.002
"#
        )
        .expect("write");

        let config = AppConfig::load_from(dir.path()).expect("config should load");
        assert_eq!(config.trading.cycle_interval_secs, 30);
        assert_eq!(config.trading.market_data_interval_secs, 10);
        assert_eq!(config.risk.initial_capital, dec!(5000));
        assert_eq!(config.risk.max_exposure, dec!(0.4));
        assert_eq!(config.risk.max_drawdown, dec!(0.5));
        assert_eq!(config.exchanges.len(), 1);
        assert_eq!(config.exchanges[0].taker_fee, dec!(0.001));

        match &config.strategies[0] {
            StrategyConfig::Arbitrage(arb) => {
                assert_eq!(arb.id, "arb-eth");
                assert_eq!(arb.min_profit_threshold, dec!(0.005));
                assert_eq!(arb.fee_rate("venue_a"), dec!(0.002));
                assert_eq!(arb.fee_rate("venue_b"), dec!(0.001));
            }
            other => panic!("unexpected strategy config: {other:?}"),
        }
    }
}
