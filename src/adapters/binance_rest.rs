//! Binance public REST market data
//!
//! Unauthenticated endpoints only: 24h ticker for quotes, klines for history.
//! The same reference quote is served for every configured venue name.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::MarketDataConfig;
use crate::domain::{Candle, Ticker, TradingPair};
use crate::error::{Result, TradeError};
use crate::exchange::MarketDataFeed;

/// Binance caps kline requests at 1000 points
const MAX_KLINES: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    bid_price: String,
    ask_price: String,
    close_time: i64,
}

#[derive(Clone)]
pub struct BinanceMarketData {
    http: Client,
    base_url: String,
}

impl BinanceMarketData {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("cryptrade/0.1")
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TradeError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(TradeError::RateLimited(format!("Binance {}", path)));
        }
        if !status.is_success() {
            return Err(TradeError::MarketDataUnavailable(format!(
                "Binance {} failed: status={} body={}",
                path, status, text
            )));
        }
        Ok(text)
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal> {
        Decimal::from_str_exact(raw.trim())
            .map_err(|e| TradeError::InvalidMarketData(format!("{field}='{raw}': {e}")))
    }

    fn decimal_at(row: &[Value], index: usize) -> Result<Decimal> {
        let raw = row
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| TradeError::InvalidMarketData(format!("kline field {index} missing")))?;
        Self::parse_decimal(raw, "kline")
    }

    fn parse_kline(row: &[Value]) -> Result<Candle> {
        let open_time = row
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| TradeError::InvalidMarketData("kline open time missing".to_string()))?;
        let timestamp = Utc
            .timestamp_millis_opt(open_time)
            .single()
            .ok_or_else(|| TradeError::InvalidMarketData(format!("bad kline time {open_time}")))?;

        Ok(Candle {
            timestamp,
            open: Self::decimal_at(row, 1)?,
            high: Self::decimal_at(row, 2)?,
            low: Self::decimal_at(row, 3)?,
            close: Self::decimal_at(row, 4)?,
            volume: Self::decimal_at(row, 5)?,
        })
    }
}

#[async_trait]
impl MarketDataFeed for BinanceMarketData {
    async fn fetch_ticker(&self, exchange: &str, trading_pair: &str) -> Result<Ticker> {
        let symbol = TradingPair::parse(trading_pair)?.symbol();
        let text = self
            .get("/api/v3/ticker/24hr", &[("symbol", symbol.clone())])
            .await?;
        let raw: Ticker24h = serde_json::from_str(&text)?;

        let timestamp = Utc
            .timestamp_millis_opt(raw.close_time)
            .single()
            .unwrap_or_else(Utc::now);
        let close = Self::parse_decimal(&raw.last_price, "lastPrice")?;
        let bid = Self::parse_decimal(&raw.bid_price, "bidPrice")?;
        let ask = Self::parse_decimal(&raw.ask_price, "askPrice")?;
        debug!("{} {} last={} bid={} ask={}", exchange, symbol, close, bid, ask);

        Ok(Ticker::new(exchange, trading_pair, close, timestamp).with_quotes(bid, ask))
    }

    async fn fetch_historical(
        &self,
        _exchange: &str,
        trading_pair: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let symbol = TradingPair::parse(trading_pair)?.symbol();
        let text = self
            .get(
                "/api/v3/klines",
                &[
                    ("symbol", symbol),
                    ("interval", interval.to_string()),
                    ("limit", limit.clamp(1, MAX_KLINES).to_string()),
                ],
            )
            .await?;

        let rows: Vec<Vec<Value>> = serde_json::from_str(&text)?;
        rows.iter().map(|row| Self::parse_kline(row)).collect()
    }
}
