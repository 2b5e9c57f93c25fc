//! Trading bot control loop
//!
//! One poller task per exchange feeds tickers into a bounded channel. Each
//! cycle then runs its stages strictly in order:
//!
//! 1. drain ticks into the strategies, queueing their signals
//! 2. consume the signal queue: risk gate, then execution
//! 3. refresh orders and reconcile fills
//! 4. mark positions, ratchet trailing stops, queue stop-loss exits
//!    (the exposure view is refreshed before they are gated)
//! 5. value the accounts and feed capital to the risk manager
//! 6. sync the risk manager's exposure view with the ledger
//!
//! A failing stage is logged and the cycle moves on.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::coordination::GracefulShutdown;
use crate::domain::{
    is_quote_currency, Direction, Order, OrderSide, PairKey, Position, Signal, SignalType, Ticker,
    TradingPair, QUOTE_CURRENCIES,
};
use crate::error::{Result, TradeError};
use crate::exchange::{ExchangeRegistry, MarketDataFeed};
use crate::execution::OrderExecutor;
use crate::monitoring::{AlertManager, MonitoringSystem, PerformanceMonitor};
use crate::risk::RiskManager;
use crate::strategy::{returns_volatility, StrategyFactory, StrategyManager};

use super::tasks::{poll_market_data, run_monitoring};

/// Counters for one control-loop cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub ticks: usize,
    pub signals_generated: usize,
    pub signals_dropped: usize,
    pub signals_admitted: usize,
    pub signals_rejected: usize,
    pub orders_submitted: usize,
    pub order_updates: usize,
    pub stop_exits: usize,
    pub capital: Option<Decimal>,
}

pub struct TradingBot {
    config: AppConfig,
    feed: Arc<dyn MarketDataFeed>,
    exchanges: ExchangeRegistry,
    strategies: StrategyManager,
    risk: Arc<Mutex<RiskManager>>,
    executor: OrderExecutor,
    monitoring: Arc<Mutex<MonitoringSystem>>,
    shutdown: Arc<GracefulShutdown>,
    tick_tx: mpsc::Sender<Ticker>,
    tick_rx: mpsc::Receiver<Ticker>,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: mpsc::Receiver<Signal>,
    latest_prices: HashMap<PairKey, Decimal>,
    volatility_cache: HashMap<PairKey, Decimal>,
    cycles: u64,
}

impl TradingBot {
    pub fn new(
        config: AppConfig,
        feed: Arc<dyn MarketDataFeed>,
        exchanges: ExchangeRegistry,
    ) -> Result<Self> {
        let now = Utc::now();
        let strategies = StrategyFactory::build_manager(&config.strategies)?;
        let order_type = config
            .execution
            .order_type()
            .map_err(TradeError::Validation)?;
        let risk = RiskManager::new(&config.risk, now);
        let executor = OrderExecutor::new(exchanges.clone(), order_type);

        let alerts = Arc::new(AlertManager::new(&config.monitoring));
        let monitoring = MonitoringSystem::new(
            config.monitoring.clone(),
            alerts,
            PerformanceMonitor::new(config.risk.initial_capital, now),
        );

        let (tick_tx, tick_rx) = mpsc::channel(config.trading.tick_channel_capacity.max(1));
        let (signal_tx, signal_rx) = mpsc::channel(config.trading.signal_queue_capacity.max(1));

        info!(
            "Trading bot ready: {} exchange(s), {} strategy(ies), mode {:?}",
            exchanges.len(),
            strategies.len(),
            config.trading.mode
        );

        Ok(Self {
            config,
            feed,
            exchanges,
            strategies,
            risk: Arc::new(Mutex::new(risk)),
            executor,
            monitoring: Arc::new(Mutex::new(monitoring)),
            shutdown: Arc::new(GracefulShutdown::new()),
            tick_tx,
            tick_rx,
            signal_tx,
            signal_rx,
            latest_prices: HashMap::new(),
            volatility_cache: HashMap::new(),
            cycles: 0,
        })
    }

    pub fn shutdown_handle(&self) -> Arc<GracefulShutdown> {
        self.shutdown.clone()
    }

    /// Sender side of the tick channel, for external producers
    pub fn tick_sender(&self) -> mpsc::Sender<Ticker> {
        self.tick_tx.clone()
    }

    pub fn risk(&self) -> Arc<Mutex<RiskManager>> {
        self.risk.clone()
    }

    pub fn monitoring(&self) -> Arc<Mutex<MonitoringSystem>> {
        self.monitoring.clone()
    }

    pub fn executor(&self) -> &OrderExecutor {
        &self.executor
    }

    /// Most recent terminal orders, newest first, up to the configured limit
    pub fn recent_orders(&self) -> Vec<&Order> {
        self.executor
            .order_history(self.config.execution.order_history_limit)
    }

    pub fn strategies_mut(&mut self) -> &mut StrategyManager {
        &mut self.strategies
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run until shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        let mut tasks = self.spawn_background_tasks();
        let cycle_interval = Duration::from_secs(self.config.trading.cycle_interval_secs.max(1));
        info!("Control loop started (cycle every {:?})", cycle_interval);

        while !self.shutdown.is_shutdown_requested() {
            let report = self.run_cycle().await;
            debug!("Cycle {} finished: {:?}", self.cycles, report);

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(cycle_interval) => {}
            }
        }

        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }
        info!("Control loop stopped after {} cycle(s)", self.cycles);
        Ok(())
    }

    /// Fetch every configured ticker once, then run a single cycle.
    pub async fn run_once(&mut self) -> CycleReport {
        self.poll_market_data_once().await;
        self.run_cycle().await
    }

    fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let interval = Duration::from_secs(self.config.trading.market_data_interval_secs.max(1));
        let mut tasks: Vec<JoinHandle<()>> = self
            .config
            .exchanges
            .iter()
            .map(|exchange| {
                tokio::spawn(poll_market_data(
                    self.feed.clone(),
                    exchange.name.clone(),
                    exchange.trading_pairs.clone(),
                    interval,
                    self.tick_tx.clone(),
                    self.shutdown.clone(),
                ))
            })
            .collect();

        tasks.push(tokio::spawn(run_monitoring(
            self.risk.clone(),
            self.monitoring.clone(),
            Duration::from_secs(self.config.trading.monitoring_interval_secs.max(1)),
            self.shutdown.clone(),
        )));
        tasks
    }

    async fn poll_market_data_once(&self) {
        for exchange in &self.config.exchanges {
            for pair in &exchange.trading_pairs {
                match self.feed.fetch_ticker(&exchange.name, pair).await {
                    Ok(ticker) => {
                        if let Err(e) = self.tick_tx.try_send(ticker) {
                            warn!("Dropping tick for {}:{}: {}", exchange.name, pair, e);
                        }
                    }
                    Err(e) => warn!("[{}] ticker {} unavailable: {}", exchange.name, pair, e),
                }
            }
        }
    }

    /// One pass of the control loop
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        self.volatility_cache.clear();
        let mut report = CycleReport::default();

        self.process_market_data(&mut report);
        self.process_signals(&mut report).await;

        let now = Utc::now();
        let changed = self.executor.update_all_orders(now).await;
        report.order_updates = changed.len();
        {
            let monitoring = self.monitoring.lock().await;
            for order in &changed {
                monitoring.monitor_order(order).await;
                self.strategies.on_order_update(order);
            }
        }
        self.process_fills().await;

        self.update_positions(&mut report).await;
        if report.stop_exits > 0 {
            // fills from this cycle must be visible so stop exits count as reducing
            self.sync_exposure().await;
            self.process_signals(&mut report).await;
            self.process_fills().await;
        }

        match self.update_account_status().await {
            Ok(capital) => report.capital = Some(capital),
            Err(e) => warn!("Account status not updated this cycle: {}", e),
        }

        self.sync_exposure().await;

        report
    }

    async fn sync_exposure(&self) {
        let entries = self.executor.ledger().exposure_entries(&self.latest_prices);
        self.risk.lock().await.sync_exposure(entries);
    }

    fn process_market_data(&mut self, report: &mut CycleReport) {
        let open = self.executor.open_directions();
        let now = Utc::now();

        while let Ok(ticker) = self.tick_rx.try_recv() {
            report.ticks += 1;
            self.latest_prices.insert(ticker.key(), ticker.close);

            for signal in self.strategies.process_market_data(&ticker, &open, now) {
                report.signals_generated += 1;
                if let Err(e) = self.signal_tx.try_send(signal) {
                    report.signals_dropped += 1;
                    warn!("Signal queue full, dropping signal: {}", e);
                }
            }
        }
    }

    async fn process_signals(&mut self, report: &mut CycleReport) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            let now = Utc::now();
            if signal.is_expired(now) {
                info!("Signal {} expired before execution", signal.id);
                report.signals_rejected += 1;
                continue;
            }

            let volatility = self.volatility_for(&signal.key()).await;
            let decision = self.risk.lock().await.evaluate_signal(&signal, volatility);
            if !decision.allowed {
                report.signals_rejected += 1;
                continue;
            }
            report.signals_admitted += 1;

            let quantity = self.order_quantity(&signal, decision.size);
            if quantity <= Decimal::ZERO {
                debug!("Signal {} sized to zero, skipping", signal.id);
                continue;
            }

            match self
                .executor
                .execute_signal(&signal, quantity, decision.stop_price, now)
                .await
            {
                Ok(order) => {
                    report.orders_submitted += 1;
                    self.monitoring.lock().await.monitor_order(&order).await;
                    self.strategies.on_order_update(&order);
                }
                Err(e) if e.is_validation() => {
                    warn!("Signal {} refused: {}", signal.id, e);
                }
                Err(e) => error!("Signal {} failed: {}", signal.id, e),
            }
        }
    }

    /// Risk size capped by the signal's own quantity; exits never exceed the
    /// open position they close
    fn order_quantity(&self, signal: &Signal, risk_size: Decimal) -> Decimal {
        let mut quantity = if signal.quantity > Decimal::ZERO {
            risk_size.min(signal.quantity)
        } else {
            risk_size
        };

        if signal.signal_type == SignalType::Exit {
            if let Some(position) = self.executor.position(&signal.key()) {
                if position.side == signal.direction {
                    quantity = quantity.min(position.quantity);
                }
            }
        }
        quantity
    }

    async fn process_fills(&mut self) {
        let fills = self.executor.drain_new_fills();
        if fills.is_empty() {
            return;
        }
        let mut monitoring = self.monitoring.lock().await;
        for fill in &fills {
            monitoring.record_fill(fill);
            self.strategies.on_trade(&fill.trade);
        }
    }

    /// Sample volatility of recent closes, cached per cycle. Falls back to
    /// the configured default when history is unavailable.
    async fn volatility_for(&mut self, key: &PairKey) -> Decimal {
        if let Some(cached) = self.volatility_cache.get(key) {
            return *cached;
        }

        let trading = &self.config.trading;
        let volatility = match self
            .feed
            .fetch_historical(
                &key.exchange,
                &key.trading_pair,
                &trading.volatility_interval,
                trading.volatility_lookback + 1,
            )
            .await
        {
            Ok(candles) => {
                let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
                returns_volatility(&closes).unwrap_or(trading.default_volatility)
            }
            Err(e) => {
                debug!("No history for {} ({}), using default volatility", key, e);
                trading.default_volatility
            }
        };

        self.volatility_cache.insert(key.clone(), volatility);
        volatility
    }

    async fn current_price(&mut self, key: &PairKey) -> Option<Decimal> {
        if let Some(price) = self.latest_prices.get(key) {
            return Some(*price);
        }
        match self.feed.fetch_ticker(&key.exchange, &key.trading_pair).await {
            Ok(ticker) => {
                self.latest_prices.insert(key.clone(), ticker.close);
                Some(ticker.close)
            }
            Err(e) => {
                warn!("No price for {}: {}", key, e);
                None
            }
        }
    }

    async fn update_positions(&mut self, report: &mut CycleReport) {
        let now = Utc::now();
        let keys: Vec<PairKey> = self.executor.ledger().positions().map(|p| p.key()).collect();

        for key in &keys {
            let Some(price) = self.current_price(key).await else {
                continue;
            };

            let Some(position) = self
                .executor
                .ledger_mut()
                .mark_to_market(key, price, now)
                .cloned()
            else {
                continue;
            };

            let stop = self
                .risk
                .lock()
                .await
                .update_trailing_stop(position.side, price, position.stop_loss_price);
            if stop != position.stop_loss_price {
                self.executor.ledger_mut().set_stop(key, stop);
            }

            self.monitoring
                .lock()
                .await
                .monitor_position(&position, price)
                .await;

            let mut stopped = position.clone();
            stopped.stop_loss_price = stop;
            if stopped.stop_triggered(price) && !self.exit_pending(key, position.side) {
                self.queue_stop_exit(&stopped, price, now);
                report.stop_exits += 1;
            }
        }

        self.monitoring.lock().await.retain_positions(keys.iter());
    }

    /// True if an order closing `side` on `key` is already working
    fn exit_pending(&self, key: &PairKey, side: Direction) -> bool {
        let closing_side = match side {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        };
        self.executor
            .open_orders()
            .iter()
            .any(|o| &o.key() == key && o.side == closing_side)
    }

    fn queue_stop_exit(&mut self, position: &Position, price: Decimal, now: DateTime<Utc>) {
        let strategy_id = position.strategy_id.as_deref().unwrap_or("risk");
        let signal = Signal::new(
            strategy_id,
            &position.exchange,
            &position.trading_pair,
            SignalType::Exit,
            position.side,
            Decimal::ONE,
            Some(price),
            position.quantity,
            now,
            ChronoDuration::seconds(self.config.trading.stop_loss_exit_ttl_secs),
        )
        .with_metadata("reason", "stop_loss");

        warn!(
            "Stop hit on {} {} at {} (stop {:?}), queueing exit",
            position.side,
            position.key(),
            price,
            position.stop_loss_price
        );
        if let Err(e) = self.signal_tx.try_send(signal) {
            error!("Could not queue stop-loss exit for {}: {}", position.key(), e);
        }
    }

    /// Total capital across venues: quote currencies at par, everything else
    /// at its latest price. Any unpriced balance skips the update.
    async fn update_account_status(&mut self) -> Result<Decimal> {
        let mut capital = Decimal::ZERO;
        let clients: Vec<_> = self
            .exchanges
            .iter()
            .map(|(name, client)| (name.to_string(), client.clone()))
            .collect();

        for (exchange, client) in clients {
            let balances = client.fetch_balance().await?;
            for (currency, amount) in balances {
                if amount.is_zero() {
                    continue;
                }
                if is_quote_currency(&currency) {
                    capital += amount;
                    continue;
                }
                let price = self.price_in_quote(&exchange, &currency).await.ok_or_else(|| {
                    TradeError::MarketDataUnavailable(format!(
                        "no quote price for {} on {}",
                        currency, exchange
                    ))
                })?;
                capital += amount * price;
            }
        }

        let now = Utc::now();
        let tripped = self.risk.lock().await.update_account_status(capital, now);
        let mut monitoring = self.monitoring.lock().await;
        monitoring.update_balance(capital);
        if let Some(reason) = tripped {
            monitoring
                .alerts()
                .critical("risk", "Circuit breaker tripped", &reason)
                .await;
        }
        debug!("Account capital {}", capital.round_dp(2));
        Ok(capital)
    }

    async fn price_in_quote(&mut self, exchange: &str, currency: &str) -> Option<Decimal> {
        let known = self.latest_prices.iter().find_map(|(key, price)| {
            if key.exchange != exchange {
                return None;
            }
            let pair = TradingPair::parse(&key.trading_pair).ok()?;
            (pair.base.eq_ignore_ascii_case(currency) && is_quote_currency(&pair.quote))
                .then_some(*price)
        });
        if known.is_some() {
            return known;
        }

        for quote in QUOTE_CURRENCIES {
            let key = PairKey::new(exchange, format!("{}/{}", currency.to_ascii_uppercase(), quote));
            if let Ok(ticker) = self.feed.fetch_ticker(exchange, &key.trading_pair).await {
                self.latest_prices.insert(key, ticker.close);
                return Some(ticker.close);
            }
        }
        None
    }
}
