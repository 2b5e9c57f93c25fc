//! Cross-venue arbitrage strategy
//!
//! Tracks the latest bid/ask per venue for each pair. When the best bid on one
//! venue exceeds the best ask on another by more than both venues' fees plus
//! the profit threshold, emits a paired buy (ask venue) / sell (bid venue).

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::config::ArbitrageConfig;
use crate::domain::{Direction, Signal, SignalType, Ticker};

use super::traits::{OpenPositions, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
struct VenueQuote {
    bid: Decimal,
    ask: Decimal,
}

/// A detected price gap between two venues
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread: Decimal,
    pub fees: Decimal,
    pub net_profit: Decimal,
}

pub struct ArbitrageStrategy {
    config: ArbitrageConfig,
    status: StrategyStatus,
    /// pair -> venue -> latest quote
    quotes: HashMap<String, BTreeMap<String, VenueQuote>>,
}

impl ArbitrageStrategy {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self {
            config,
            status: StrategyStatus::Active,
            quotes: HashMap::new(),
        }
    }

    /// Best profitable opportunity for `trading_pair`, if any
    pub fn find_opportunity(&self, trading_pair: &str) -> Option<Opportunity> {
        let venues = self.quotes.get(trading_pair)?;
        if venues.len() < 2 {
            return None;
        }

        let (sell_exchange, best_bid) = venues
            .iter()
            .max_by(|a, b| a.1.bid.cmp(&b.1.bid))
            .map(|(venue, q)| (venue, q.bid))?;
        let (buy_exchange, best_ask) = venues
            .iter()
            .min_by(|a, b| a.1.ask.cmp(&b.1.ask))
            .map(|(venue, q)| (venue, q.ask))?;

        if sell_exchange == buy_exchange || best_ask <= Decimal::ZERO {
            return None;
        }

        let spread = (best_bid - best_ask) / best_ask;
        let fees = self.config.fee_rate(buy_exchange) + self.config.fee_rate(sell_exchange);
        let net_profit = spread - fees;
        if net_profit <= Decimal::ZERO || net_profit < self.config.min_profit_threshold {
            return None;
        }

        Some(Opportunity {
            buy_exchange: buy_exchange.clone(),
            sell_exchange: sell_exchange.clone(),
            buy_price: best_ask,
            sell_price: best_bid,
            spread,
            fees,
            net_profit,
        })
    }

    fn signals_for(&self, trading_pair: &str, opp: &Opportunity, now: DateTime<Utc>) -> Vec<Signal> {
        let strength = (opp.net_profit * Decimal::TEN).min(Decimal::ONE);
        let quantity =
            self.config.reference_capital * self.config.max_position_size * strength / opp.buy_price;
        let ttl = Duration::seconds(self.config.execution_window_secs);
        let arbitrage_id = Uuid::new_v4().to_string();
        let expected_profit = opp.net_profit.round_dp(8).to_string();

        let buy = Signal::new(
            &self.config.id,
            &opp.buy_exchange,
            trading_pair,
            SignalType::Entry,
            Direction::Long,
            strength,
            Some(opp.buy_price),
            quantity,
            now,
            ttl,
        )
        .with_metadata("arbitrage_type", "buy")
        .with_metadata("arbitrage_id", arbitrage_id.clone())
        .with_metadata("sell_exchange", opp.sell_exchange.clone())
        .with_metadata("sell_price", opp.sell_price.to_string())
        .with_metadata("expected_profit", expected_profit.clone());

        let sell = Signal::new(
            &self.config.id,
            &opp.sell_exchange,
            trading_pair,
            SignalType::Exit,
            Direction::Long,
            strength,
            Some(opp.sell_price),
            quantity,
            now,
            ttl,
        )
        .with_metadata("arbitrage_type", "sell")
        .with_metadata("arbitrage_id", arbitrage_id)
        .with_metadata("buy_exchange", opp.buy_exchange.clone())
        .with_metadata("buy_price", opp.buy_price.to_string())
        .with_metadata("expected_profit", expected_profit);

        vec![buy, sell]
    }
}

impl Strategy for ArbitrageStrategy {
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
        _open_positions: &OpenPositions,
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let (Some(bid), Some(ask)) = (ticker.bid, ticker.ask) else {
            return Vec::new();
        };
        self.quotes
            .entry(ticker.trading_pair.clone())
            .or_default()
            .insert(ticker.exchange.clone(), VenueQuote { bid, ask });

        let Some(opp) = self.find_opportunity(&ticker.trading_pair) else {
            return Vec::new();
        };

        info!(
            "[{}] {} gap: buy {} @ {} / sell {} @ {} (net {})",
            self.config.id,
            ticker.trading_pair,
            opp.buy_exchange,
            opp.buy_price,
            opp.sell_exchange,
            opp.sell_price,
            opp.net_profit.round_dp(6)
        );
        self.signals_for(&ticker.trading_pair, &opp, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn strategy() -> ArbitrageStrategy {
        ArbitrageStrategy::new(ArbitrageConfig {
            id: "arb".to_string(),
            min_profit_threshold: dec!(0.005),
            default_fee_rate: dec!(0.001),
            ..ArbitrageConfig::default()
        })
    }

    fn quote(exchange: &str, bid: Decimal, ask: Decimal) -> Ticker {
        Ticker::new(exchange, "BTC/USDT", (bid + ask) / Decimal::TWO, Utc::now()).with_quotes(bid, ask)
    }

    #[test]
    fn test_paired_signals_on_profitable_gap() {
        let mut arb = strategy();
        let open = OpenPositions::new();
        assert!(arb.on_market_data(&quote("a", dec!(99), dec!(100)), &open, Utc::now()).is_empty());

        let signals = arb.on_market_data(&quote("b", dec!(102), dec!(103)), &open, Utc::now());
        assert_eq!(signals.len(), 2);

        let buy = &signals[0];
        assert_eq!(buy.exchange, "a");
        assert_eq!(buy.signal_type, SignalType::Entry);
        assert_eq!(buy.direction, Direction::Long);
        assert_eq!(buy.price, Some(dec!(100)));

        let sell = &signals[1];
        assert_eq!(sell.exchange, "b");
        assert_eq!(sell.signal_type, SignalType::Exit);
        assert_eq!(sell.price, Some(dec!(102)));

        // net = 2% - 0.2% = 1.8%, strength = 0.18
        assert_eq!(buy.strength, dec!(0.18));
        assert_eq!(buy.expiration, sell.expiration);
        assert_eq!(buy.metadata.get("arbitrage_id"), sell.metadata.get("arbitrage_id"));
        assert_eq!(buy.metadata_str("expected_profit"), Some("0.018"));
        // 10000 * 0.1 * 0.18 / 100
        assert_eq!(buy.quantity, dec!(1.8));
    }

    #[test]
    fn test_thin_spread_is_ignored() {
        let mut arb = strategy();
        let open = OpenPositions::new();
        arb.on_market_data(&quote("a", dec!(99.9), dec!(100)), &open, Utc::now());
        let signals = arb.on_market_data(&quote("b", dec!(100.1), dec!(100.2)), &open, Utc::now());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_same_venue_best_prices_are_ignored() {
        let mut arb = strategy();
        arb.on_market_data(&quote("a", dec!(105), dec!(100)), &OpenPositions::new(), Utc::now());
        arb.on_market_data(&quote("b", dec!(99), dec!(101)), &OpenPositions::new(), Utc::now());
        assert!(arb.find_opportunity("BTC/USDT").is_none());
    }

    #[test]
    fn test_per_venue_fee_override() {
        let mut config = ArbitrageConfig {
            min_profit_threshold: dec!(0.005),
            ..ArbitrageConfig::default()
        };
        config.fee_rates.insert("b".to_string(), dec!(0.02));
        let mut arb = ArbitrageStrategy::new(config);
        arb.on_market_data(&quote("a", dec!(99), dec!(100)), &OpenPositions::new(), Utc::now());
        let signals = arb.on_market_data(&quote("b", dec!(102), dec!(103)), &OpenPositions::new(), Utc::now());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_strength_is_capped() {
        let mut arb = strategy();
        arb.on_market_data(&quote("a", dec!(99), dec!(100)), &OpenPositions::new(), Utc::now());
        let signals = arb.on_market_data(&quote("b", dec!(130), dec!(131)), &OpenPositions::new(), Utc::now());
        assert_eq!(signals[0].strength, Decimal::ONE);
    }
}
