//! Immutable simulation parameters.
//!
//! Everything the portfolio and the execution handlers need is threaded in through
//! [`SimulationConfig`]; no component reads rates from anywhere else.

use super::market::PriceConverter;

/// A-share lot: the minimum buy increment.
pub const DEFAULT_LOT_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct DomesticFees {
    pub commission_rate: f64,
    pub min_commission: f64,
    /// Charged on sells only.
    pub stamp_duty_rate: f64,
    pub transfer_fee_rate: f64,
    pub lot_size: i64,
}

impl Default for DomesticFees {
    fn default() -> Self {
        DomesticFees {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_duty_rate: 0.0005,
            transfer_fee_rate: 0.00001,
            lot_size: DEFAULT_LOT_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossBorderFees {
    /// Base-currency units per quote-currency unit.
    pub exchange_rate: f64,
    /// FX conversion loss, booked as a cost on the base-currency value.
    pub fx_slippage: f64,
    pub commission_rate: f64,
    /// In base currency.
    pub min_commission: f64,
    /// Charged both ways on the quote-currency value.
    pub stamp_duty_rate: f64,
    /// Stamp duty is rounded up to a multiple of this, in quote currency.
    pub stamp_rounding_unit: f64,
    pub regulatory_fee_rate: f64,
}

impl Default for CrossBorderFees {
    fn default() -> Self {
        CrossBorderFees {
            exchange_rate: 0.92,
            fx_slippage: 0.002,
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_duty_rate: 0.001,
            stamp_rounding_unit: 1.0,
            regulatory_fee_rate: 0.000085,
        }
    }
}

/// Risk-exit thresholds as fractions (0.1 = 10%). Zero disables a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskParams {
    pub stop_loss: f64,
    pub trailing_stop: f64,
    pub take_profit: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            stop_loss: 0.1,
            trailing_stop: 0.15,
            take_profit: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingParams {
    /// Fraction of available cash spent per Long signal.
    pub buy_fraction: f64,
    /// Fraction of current holdings sold per Short signal.
    pub sell_fraction: f64,
    /// Cap on one symbol's value as a fraction of total equity.
    pub max_single_position: f64,
}

impl Default for SizingParams {
    fn default() -> Self {
        SizingParams {
            buy_fraction: 0.2,
            sell_fraction: 0.2,
            max_single_position: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub initial_cash: f64,
    pub allow_short: bool,
    pub lot_size: i64,
    pub sizing: SizingParams,
    pub risk: RiskParams,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        PortfolioConfig {
            initial_cash: 100_000.0,
            allow_short: false,
            lot_size: DEFAULT_LOT_SIZE,
            sizing: SizingParams::default(),
            risk: RiskParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationConfig {
    pub portfolio: PortfolioConfig,
    pub domestic: DomesticFees,
    pub cross_border: CrossBorderFees,
}

impl SimulationConfig {
    pub fn price_converter(&self) -> PriceConverter {
        PriceConverter {
            cross_border_rate: self.cross_border.exchange_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_share_rules() {
        let config = SimulationConfig::default();
        assert_eq!(config.domestic.lot_size, 100);
        assert_eq!(config.portfolio.lot_size, 100);
        assert_eq!(config.domestic.min_commission, 5.0);
        assert_eq!(config.domestic.stamp_duty_rate, 0.0005);
        assert!(!config.portfolio.allow_short);
    }

    #[test]
    fn default_risk_thresholds() {
        let risk = RiskParams::default();
        assert_eq!(risk.stop_loss, 0.1);
        assert_eq!(risk.trailing_stop, 0.15);
        assert_eq!(risk.take_profit, 0.3);
    }

    #[test]
    fn price_converter_uses_cross_border_rate() {
        let config = SimulationConfig {
            cross_border: CrossBorderFees {
                exchange_rate: 0.9,
                ..CrossBorderFees::default()
            },
            ..SimulationConfig::default()
        };
        assert!((config.price_converter().to_base("00700", 100.0) - 90.0).abs() < 1e-9);
    }
}
