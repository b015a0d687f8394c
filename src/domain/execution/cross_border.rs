//! Cross-border (Stock Connect) execution.
//!
//! Prices arrive quoted in the foreign currency and fills are booked in the base
//! currency at the configured reference rate. The FX spread is charged as a fee rather
//! than folded into the price, and stamp duty is rounded up in the quote currency before
//! conversion.

use super::{ExecutionHandler, PriceCache, Quote, fill_from_quote, precheck};
use crate::domain::config::CrossBorderFees;
use crate::domain::error::ExecutionError;
use crate::domain::event::{CostBreakdown, Direction, FillEvent, MarketEvent, OrderEvent};
use crate::domain::market::Market;

/// Costs for a trade worth `value_quote` in the quote currency. Every leg is charged
/// both ways.
pub fn cross_border_costs(fees: &CrossBorderFees, value_quote: f64) -> CostBreakdown {
    let rate = fees.exchange_rate;
    let value_base = value_quote * rate;

    let stamp_quote = value_quote * fees.stamp_duty_rate;
    let stamp_quote = if fees.stamp_rounding_unit > 0.0 {
        (stamp_quote / fees.stamp_rounding_unit).ceil() * fees.stamp_rounding_unit
    } else {
        stamp_quote
    };

    CostBreakdown {
        commission: (value_base * fees.commission_rate).max(fees.min_commission),
        tax: stamp_quote * rate,
        transfer_fee: value_quote * fees.regulatory_fee_rate * rate,
        fx_cost: value_base * fees.fx_slippage,
    }
}

#[derive(Debug, Clone)]
pub struct CrossBorderHandler {
    fees: CrossBorderFees,
    prices: PriceCache,
}

impl CrossBorderHandler {
    pub fn new(fees: CrossBorderFees) -> Self {
        CrossBorderHandler {
            fees,
            prices: PriceCache::default(),
        }
    }

    pub fn fees(&self) -> &CrossBorderFees {
        &self.fees
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }
}

impl ExecutionHandler for CrossBorderHandler {
    fn market(&self) -> Market {
        Market::CrossBorder
    }

    fn on_market(&mut self, event: &MarketEvent) {
        self.prices.update(event);
    }

    fn quote(&self, direction: Direction, quoted_price: f64, quantity: i64) -> Quote {
        let value_quote = quoted_price * quantity as f64;
        let price = quoted_price * self.fees.exchange_rate;
        Quote {
            market: Market::CrossBorder,
            direction,
            quantity,
            quoted_price,
            price,
            value: price * quantity as f64,
            costs: cross_border_costs(&self.fees, value_quote),
        }
    }

    fn execute(&self, order: &OrderEvent) -> Result<FillEvent, ExecutionError> {
        let (quoted_price, timestamp) = precheck(&self.prices, order)?;
        let quote = self.quote(order.direction, quoted_price, order.quantity);
        Ok(fill_from_quote(order, timestamp, &quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn handler_with_price(symbol: &str, close: f64) -> CrossBorderHandler {
        let mut handler = CrossBorderHandler::new(CrossBorderFees::default());
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        handler.on_market(&MarketEvent::new(Bar::daily(
            symbol, date, close, close, close, close, 1_000,
        )));
        handler
    }

    #[test]
    fn cost_legs_with_default_rates() {
        // 100 shares at 301.5 HKD
        let costs = cross_border_costs(&CrossBorderFees::default(), 30_150.0);
        assert_relative_eq!(costs.fx_cost, 27_738.0 * 0.002, epsilon = 1e-9);
        assert_relative_eq!(costs.commission, 27_738.0 * 0.0003, epsilon = 1e-9);
        assert_relative_eq!(costs.transfer_fee, 30_150.0 * 0.000085 * 0.92, epsilon = 1e-9);
        // 30.15 HKD of stamp duty rounds up to 31 before conversion.
        assert_relative_eq!(costs.tax, 31.0 * 0.92, epsilon = 1e-9);
    }

    #[test]
    fn stamp_duty_charged_on_buys_and_sells() {
        let handler = handler_with_price("00700", 301.5);
        let buy = handler.quote(Direction::Buy, 301.5, 100);
        let sell = handler.quote(Direction::Sell, 301.5, 100);
        assert_relative_eq!(buy.costs.tax, sell.costs.tax);
        assert_relative_eq!(buy.total_cost(), sell.total_cost());
    }

    #[test]
    fn small_trade_pays_minimum_commission() {
        let costs = cross_border_costs(&CrossBorderFees::default(), 1_500.0);
        assert_relative_eq!(costs.commission, 5.0);
        // 1.5 HKD stamp duty rounds up to 2.
        assert_relative_eq!(costs.tax, 2.0 * 0.92, epsilon = 1e-9);
    }

    #[test]
    fn custom_rounding_unit() {
        let fees = CrossBorderFees {
            stamp_rounding_unit: 5.0,
            ..CrossBorderFees::default()
        };
        let costs = cross_border_costs(&fees, 30_150.0);
        assert_relative_eq!(costs.tax, 35.0 * 0.92, epsilon = 1e-9);
    }

    #[test]
    fn fill_is_booked_in_base_currency() {
        let handler = handler_with_price("00700", 301.5);
        let fill = handler
            .execute(&OrderEvent::market(4, "00700", 100, Direction::Buy))
            .unwrap();
        assert_relative_eq!(fill.price, 277.38, epsilon = 1e-9);
        assert_relative_eq!(fill.trade_value(), 27_738.0, epsilon = 1e-6);
        let expected = 27_738.0 * 0.002 + 27_738.0 * 0.0003 + 30_150.0 * 0.000085 * 0.92 + 31.0 * 0.92;
        assert_relative_eq!(fill.cost, expected, epsilon = 1e-9);
    }

    #[test]
    fn odd_quantity_is_not_lot_checked() {
        let handler = handler_with_price("00700", 300.0);
        assert!(handler
            .execute(&OrderEvent::market(5, "00700", 50, Direction::Buy))
            .is_ok());
    }

    #[test]
    fn no_price_is_rejected() {
        let handler = CrossBorderHandler::new(CrossBorderFees::default());
        assert!(matches!(
            handler.execute(&OrderEvent::market(6, "00700", 100, Direction::Buy)),
            Err(ExecutionError::NoPrice { .. })
        ));
    }
}
