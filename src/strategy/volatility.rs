//! Return-series volatility
//!
//! Volatility is the sample standard deviation of consecutive simple returns,
//! computed in `f64` and handed back as `Decimal` for the risk pipeline.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Simple returns `p[i]/p[i-1] - 1`, skipping non-positive bases
pub fn simple_returns(prices: &[Decimal]) -> Vec<f64> {
    prices
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].to_f64()?;
            let next = w[1].to_f64()?;
            (prev > 0.0).then(|| next / prev - 1.0)
        })
        .collect()
}

/// Sample (n-1) standard deviation; `None` with fewer than two values
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Volatility of a close-price series
pub fn returns_volatility(prices: &[Decimal]) -> Option<Decimal> {
    let std_dev = sample_std_dev(&simple_returns(prices))?;
    Decimal::from_f64(std_dev)
}
