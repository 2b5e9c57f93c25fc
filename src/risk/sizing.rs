use rust_decimal::Decimal;

use crate::config::RiskConfig;

/// Notional position sizing from capital and volatility
#[derive(Debug, Clone)]
pub struct PositionSizer {
    max_position_size: Decimal,
    risk_per_trade: Decimal,
    volatility_scaling: bool,
}

impl PositionSizer {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_position_size: config.max_position_size,
            risk_per_trade: config.risk_per_trade,
            volatility_scaling: config.volatility_scaling,
        }
    }

    /// `capital * max_position_size`, capped at `capital * risk_per_trade / volatility`
    /// when volatility scaling is on and volatility is positive
    pub fn calculate(&self, available_capital: Decimal, volatility: Decimal) -> Decimal {
        let base = available_capital * self.max_position_size;
        if self.volatility_scaling && volatility > Decimal::ZERO {
            let volatility_cap = available_capital * self.risk_per_trade / volatility;
            base.min(volatility_cap)
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_max_fraction_caps_calm_markets() {
        let sizer = PositionSizer::new(&RiskConfig::default());
        // base 2000, vol cap 10000 * 0.02 / 0.05 = 4000
        assert_eq!(sizer.calculate(dec!(10000), dec!(0.05)), dec!(2000));
    }

    #[test]
    fn test_volatility_caps_wild_markets() {
        let sizer = PositionSizer::new(&RiskConfig::default());
        // vol cap 10000 * 0.02 / 0.2 = 1000
        assert_eq!(sizer.calculate(dec!(10000), dec!(0.2)), dec!(1000));
    }

    #[test]
    fn test_zero_volatility_or_scaling_off_uses_base() {
        let sizer = PositionSizer::new(&RiskConfig::default());
        assert_eq!(sizer.calculate(dec!(10000), Decimal::ZERO), dec!(2000));

        let unscaled = PositionSizer::new(&RiskConfig {
            volatility_scaling: false,
            ..RiskConfig::default()
        });
        assert_eq!(unscaled.calculate(dec!(10000), dec!(0.2)), dec!(2000));
    }
}
