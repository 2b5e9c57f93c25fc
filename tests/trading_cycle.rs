//! End-to-end cycles against the in-memory feed and the paper venue

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cryptrade::adapters::{InMemoryFeed, PaperExchange};
use cryptrade::config::{
    AppConfig, ArbitrageConfig, ExchangeConfig, MaCrossoverConfig, MarketDataSource,
    StrategyConfig,
};
use cryptrade::domain::{Direction, PairKey, Ticker};
use cryptrade::exchange::{ExchangeRegistry, MarketDataFeed};
use cryptrade::TradingBot;

const VENUE: &str = "paper";
const PAIR: &str = "BTC/USDT";

fn exchange_config(name: &str) -> ExchangeConfig {
    ExchangeConfig {
        name: name.to_string(),
        trading_pairs: vec![PAIR.to_string()],
        maker_fee: Decimal::ZERO,
        taker_fee: Decimal::ZERO,
        slippage: Decimal::ZERO,
        initial_balances: HashMap::from([("USDT".to_string(), dec!(10000))]),
    }
}

fn ma_config() -> AppConfig {
    let mut config = AppConfig::default_config();
    config.market_data.source = MarketDataSource::Static;
    config.exchanges = vec![exchange_config(VENUE)];
    config.strategies = vec![StrategyConfig::MaCrossover(MaCrossoverConfig {
        id: "ma".to_string(),
        short_window: 2,
        long_window: 3,
        target_pairs: vec![PAIR.to_string()],
        ..MaCrossoverConfig::default()
    })];
    config
}

fn build(config: AppConfig, feed: Arc<InMemoryFeed>) -> TradingBot {
    let mut exchanges = ExchangeRegistry::new();
    for exchange in &config.exchanges {
        let venue_feed: Arc<dyn MarketDataFeed> = feed.clone();
        exchanges.insert(&exchange.name, Arc::new(PaperExchange::new(exchange, venue_feed)));
    }
    TradingBot::new(config, feed, exchanges).expect("bot")
}

async fn push_ticks(bot: &TradingBot, prices: &[Decimal]) {
    let tx = bot.tick_sender();
    for price in prices {
        tx.send(Ticker::new(VENUE, PAIR, *price, Utc::now()))
            .await
            .expect("tick channel open");
    }
}

#[tokio::test]
async fn test_crossover_entry_then_trailing_stop_exit() {
    let feed = Arc::new(InMemoryFeed::new());
    feed.set_price(VENUE, PAIR, dec!(12)).await;
    let mut bot = build(ma_config(), feed.clone());
    let key = PairKey::new(VENUE, PAIR);

    push_ticks(&bot, &[dec!(10), dec!(10), dec!(10), dec!(12)]).await;
    let report = bot.run_cycle().await;

    assert_eq!(report.ticks, 4);
    assert_eq!(report.signals_generated, 1);
    assert_eq!(report.signals_admitted, 1);
    assert_eq!(report.orders_submitted, 1);
    assert_eq!(report.stop_exits, 0);

    let position = bot.executor().position(&key).cloned().expect("position opened");
    assert_eq!(position.side, Direction::Long);
    assert_eq!(position.entry_price, dec!(12));
    // entry - default volatility * risk multiplier
    assert_eq!(position.stop_loss_price, Some(dec!(11.96)));

    let capital = report.capital.expect("capital valued");
    assert!((capital - dec!(10000)).abs() < dec!(0.01));

    // A drop through the stop queues and fills the exit in the same cycle
    feed.set_price(VENUE, PAIR, dec!(11)).await;
    push_ticks(&bot, &[dec!(11)]).await;
    let report = bot.run_cycle().await;

    assert_eq!(report.stop_exits, 1);
    assert!(bot.executor().position(&key).is_none());
    assert_eq!(bot.executor().trade_history().len(), 2);
    assert_eq!(bot.recent_orders().len(), 2);

    let monitoring = bot.monitoring();
    let metrics = monitoring.lock().await.performance().metrics();
    assert_eq!(metrics.losing_trades, 1);
    assert!(metrics.total_pnl < Decimal::ZERO);

    let capital = report.capital.expect("capital valued");
    assert!(capital < dec!(10000));
    assert!(bot.risk().lock().await.exposure().position_count() == 0);
}

#[tokio::test]
async fn test_tripped_circuit_breaker_blocks_entries() {
    let feed = Arc::new(InMemoryFeed::new());
    feed.set_price(VENUE, PAIR, dec!(12)).await;
    let mut bot = build(ma_config(), feed);

    let tripped = bot
        .risk()
        .lock()
        .await
        .update_account_status(dec!(9000), Utc::now());
    assert!(tripped.is_some());

    push_ticks(&bot, &[dec!(10), dec!(10), dec!(10), dec!(12)]).await;
    let report = bot.run_cycle().await;

    assert_eq!(report.signals_generated, 1);
    assert_eq!(report.signals_rejected, 1);
    assert_eq!(report.orders_submitted, 0);
    assert!(bot.executor().open_orders().is_empty());
    assert!(bot.executor().trade_history().is_empty());
}

#[tokio::test]
async fn test_full_signal_queue_drops_overflow() {
    let feed = Arc::new(InMemoryFeed::new());
    let mut config = ma_config();
    config.trading.signal_queue_capacity = 1;
    config.exchanges = vec![exchange_config("a"), exchange_config("b")];
    config.strategies = vec![StrategyConfig::Arbitrage(ArbitrageConfig {
        id: "arb".to_string(),
        min_profit_threshold: dec!(0.005),
        default_fee_rate: dec!(0.001),
        ..ArbitrageConfig::default()
    })];
    let mut bot = build(config, feed);

    let tx = bot.tick_sender();
    tx.send(Ticker::new("a", PAIR, dec!(99.5), Utc::now()).with_quotes(dec!(99), dec!(100)))
        .await
        .expect("send");
    tx.send(Ticker::new("b", PAIR, dec!(102.5), Utc::now()).with_quotes(dec!(102), dec!(103)))
        .await
        .expect("send");

    let report = bot.run_cycle().await;
    assert_eq!(report.signals_generated, 2);
    assert_eq!(report.signals_dropped, 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let feed = Arc::new(InMemoryFeed::new());
    feed.set_price(VENUE, PAIR, dec!(100)).await;
    let mut config = ma_config();
    config.trading.cycle_interval_secs = 1;
    config.trading.market_data_interval_secs = 1;
    config.trading.monitoring_interval_secs = 1;
    let mut bot = build(config, feed);
    let shutdown = bot.shutdown_handle();

    let handle = tokio::spawn(async move {
        let result = bot.run().await;
        (result, bot.cycles())
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.request_shutdown(cryptrade::ShutdownSignal::Requested);

    let (result, cycles) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop exits promptly")
        .expect("task joins");
    tokio_test::assert_ok!(result);
    assert!(cycles >= 1);
}

#[tokio::test]
async fn test_run_once_polls_configured_pairs() {
    let feed = Arc::new(InMemoryFeed::new());
    feed.set_price(VENUE, PAIR, dec!(100)).await;
    let mut bot = build(ma_config(), feed);

    let report = bot.run_once().await;
    assert_eq!(report.ticks, 1);
    assert_eq!(report.signals_generated, 0);
    assert_eq!(report.capital, Some(dec!(10000)));
}
