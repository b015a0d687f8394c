//! Domestic A-share execution: prices are already in the base currency.

use super::{ExecutionHandler, PriceCache, Quote, fill_from_quote, precheck};
use crate::domain::config::DomesticFees;
use crate::domain::error::ExecutionError;
use crate::domain::event::{CostBreakdown, Direction, FillEvent, MarketEvent, OrderEvent};
use crate::domain::market::Market;

/// Commission (with minimum) and transfer fee both ways; stamp duty on sells only.
pub fn domestic_costs(fees: &DomesticFees, direction: Direction, value: f64) -> CostBreakdown {
    let tax = match direction {
        Direction::Buy => 0.0,
        Direction::Sell => value * fees.stamp_duty_rate,
    };
    CostBreakdown {
        commission: (value * fees.commission_rate).max(fees.min_commission),
        tax,
        transfer_fee: value * fees.transfer_fee_rate,
        fx_cost: 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct DomesticHandler {
    fees: DomesticFees,
    prices: PriceCache,
}

impl DomesticHandler {
    pub fn new(fees: DomesticFees) -> Self {
        DomesticHandler {
            fees,
            prices: PriceCache::default(),
        }
    }

    pub fn fees(&self) -> &DomesticFees {
        &self.fees
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }
}

impl ExecutionHandler for DomesticHandler {
    fn market(&self) -> Market {
        Market::Domestic
    }

    fn on_market(&mut self, event: &MarketEvent) {
        self.prices.update(event);
    }

    fn quote(&self, direction: Direction, quoted_price: f64, quantity: i64) -> Quote {
        let value = quoted_price * quantity as f64;
        Quote {
            market: Market::Domestic,
            direction,
            quantity,
            quoted_price,
            price: quoted_price,
            value,
            costs: domestic_costs(&self.fees, direction, value),
        }
    }

    fn execute(&self, order: &OrderEvent) -> Result<FillEvent, ExecutionError> {
        let (price, timestamp) = precheck(&self.prices, order)?;
        let lot_size = self.fees.lot_size;
        if order.direction == Direction::Buy && lot_size > 0 && order.quantity % lot_size != 0 {
            return Err(ExecutionError::LotSizeViolation {
                symbol: order.symbol.clone(),
                quantity: order.quantity,
                lot_size,
            });
        }
        let quote = self.quote(order.direction, price, order.quantity);
        Ok(fill_from_quote(order, timestamp, &quote))
    }
}
