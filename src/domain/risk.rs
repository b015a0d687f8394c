//! Risk-exit rules evaluated on every price update of an open position.

use std::fmt;

use super::config::RiskParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskRule {
    StopLoss,
    TrailingStop,
    TakeProfit,
}

impl RiskRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRule::StopLoss => "STOP_LOSS",
            RiskRule::TrailingStop => "TRAILING_STOP",
            RiskRule::TakeProfit => "TAKE_PROFIT",
        }
    }
}

impl fmt::Display for RiskRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fractional drop of `price` below the high-water mark; 0 when at or above it.
pub fn drawdown_from_peak(high_water_mark: f64, price: f64) -> f64 {
    if high_water_mark <= 0.0 || price >= high_water_mark {
        return 0.0;
    }
    (high_water_mark - price) / high_water_mark
}

/// Returns the first rule that fires, checked in the order stop-loss, trailing stop,
/// take-profit.
///
/// `unrealized_return` is signed so that a gain is positive. `drawdown` is `None` when no
/// high-water mark is tracked (short positions). A zero threshold disables its rule.
pub fn evaluate_risk_exit(
    params: &RiskParams,
    unrealized_return: f64,
    drawdown: Option<f64>,
) -> Option<RiskRule> {
    if params.stop_loss > 0.0 && unrealized_return <= -params.stop_loss {
        return Some(RiskRule::StopLoss);
    }
    if params.trailing_stop > 0.0
        && unrealized_return > 0.0
        && drawdown.is_some_and(|dd| dd >= params.trailing_stop)
    {
        return Some(RiskRule::TrailingStop);
    }
    if params.take_profit > 0.0 && unrealized_return >= params.take_profit {
        return Some(RiskRule::TakeProfit);
    }
    None
}
