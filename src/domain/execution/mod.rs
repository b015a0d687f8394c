//! Order execution: turns orders into fills with market-accurate costs.
//!
//! The [`ExecutionRouter`] classifies every order by [`Market`] and hands it to the
//! matching concrete handler. Fills are synthesized from the last cached price for the
//! symbol; there is no order book.

pub mod cross_border;
pub mod domestic;

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::config::SimulationConfig;
use super::error::ExecutionError;
use super::event::{
    CostBreakdown, Direction, Event, FillEvent, MarketEvent, OrderEvent, OrderKind,
};
use super::event_bus::{EventHandler, Outbox};
use super::market::Market;

pub use cross_border::CrossBorderHandler;
pub use domestic::DomesticHandler;

/// Last close and bar timestamp seen per symbol.
///
/// Only tradable closes are cached. A zero, negative or non-finite close evicts the
/// symbol, so orders against it are rejected until a usable bar arrives.
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    prices: HashMap<String, (f64, NaiveDateTime)>,
}

impl PriceCache {
    pub fn update(&mut self, event: &MarketEvent) {
        if !event.has_tradable_price() {
            tracing::warn!(symbol = event.symbol(), close = event.close(), "untradable close, price dropped");
            self.prices.remove(event.symbol());
            return;
        }
        self.prices
            .insert(event.symbol().to_string(), (event.close(), event.timestamp()));
    }

    pub fn get(&self, symbol: &str) -> Option<(f64, NaiveDateTime)> {
        self.prices.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Cost of trading `quantity` shares at a quoted price, in the base currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub market: Market,
    pub direction: Direction,
    pub quantity: i64,
    pub quoted_price: f64,
    /// Quoted price converted to the base currency.
    pub price: f64,
    pub value: f64,
    pub costs: CostBreakdown,
}

impl Quote {
    pub fn total_cost(&self) -> f64 {
        self.costs.total()
    }

    /// Cash leaving the account on a buy, or arriving on a sell.
    pub fn settlement_amount(&self) -> f64 {
        match self.direction {
            Direction::Buy => self.value + self.total_cost(),
            Direction::Sell => self.value - self.total_cost(),
        }
    }
}

/// Shared behaviour of the per-market handlers.
pub trait ExecutionHandler {
    fn market(&self) -> Market;

    fn on_market(&mut self, event: &MarketEvent);

    /// Costs of a hypothetical trade at `quoted_price`, without touching any state.
    fn quote(&self, direction: Direction, quoted_price: f64, quantity: i64) -> Quote;

    fn execute(&self, order: &OrderEvent) -> Result<FillEvent, ExecutionError>;
}

/// Checks shared by every handler; returns the cached price and its timestamp.
fn precheck(prices: &PriceCache, order: &OrderEvent) -> Result<(f64, NaiveDateTime), ExecutionError> {
    if order.kind != OrderKind::Market {
        return Err(ExecutionError::UnsupportedOrderKind {
            symbol: order.symbol.clone(),
        });
    }
    if order.quantity <= 0 {
        return Err(ExecutionError::InvalidQuantity {
            symbol: order.symbol.clone(),
            quantity: order.quantity,
        });
    }
    prices.get(&order.symbol).ok_or_else(|| ExecutionError::NoPrice {
        symbol: order.symbol.clone(),
    })
}

fn fill_from_quote(order: &OrderEvent, timestamp: NaiveDateTime, quote: &Quote) -> FillEvent {
    tracing::info!(
        order_id = order.id,
        symbol = %order.symbol,
        market = %quote.market,
        direction = %quote.direction,
        quantity = quote.quantity,
        quoted_price = quote.quoted_price,
        price = quote.price,
        value = quote.value,
        cost = quote.total_cost(),
        settlement = quote.settlement_amount(),
        "order filled"
    );
    FillEvent::with_costs(
        order.id,
        &order.symbol,
        timestamp,
        quote.quantity,
        quote.direction,
        quote.price,
        quote.costs,
    )
}

pub struct ExecutionRouter {
    domestic: DomesticHandler,
    cross_border: CrossBorderHandler,
    last_timestamp: NaiveDateTime,
}

impl ExecutionRouter {
    pub fn new(config: &SimulationConfig) -> Self {
        ExecutionRouter {
            domestic: DomesticHandler::new(config.domestic.clone()),
            cross_border: CrossBorderHandler::new(config.cross_border.clone()),
            last_timestamp: NaiveDateTime::default(),
        }
    }

    pub fn domestic(&self) -> &DomesticHandler {
        &self.domestic
    }

    pub fn cross_border(&self) -> &CrossBorderHandler {
        &self.cross_border
    }

    pub fn on_market(&mut self, event: &MarketEvent) {
        self.last_timestamp = event.timestamp();
        match Market::classify(event.symbol()) {
            Market::Domestic => self.domestic.on_market(event),
            Market::CrossBorder => self.cross_border.on_market(event),
        }
    }

    pub fn route(&self, order: &OrderEvent) -> Result<FillEvent, ExecutionError> {
        match Market::classify(&order.symbol) {
            Market::Domestic => self.domestic.execute(order),
            Market::CrossBorder => self.cross_border.execute(order),
        }
    }

    pub fn quote(&self, symbol: &str, direction: Direction, quoted_price: f64, quantity: i64) -> Quote {
        match Market::classify(symbol) {
            Market::Domestic => self.domestic.quote(direction, quoted_price, quantity),
            Market::CrossBorder => self.cross_border.quote(direction, quoted_price, quantity),
        }
    }
}

impl EventHandler for ExecutionRouter {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox<'_>) {
        match event {
            Event::Market(market) => self.on_market(market),
            Event::Order(order) => match self.route(order) {
                Ok(fill) => outbox.publish(fill),
                Err(reason) => {
                    tracing::warn!(order_id = order.id, %reason, "order not executed");
                    outbox.publish(FillEvent::rejected(order, self.last_timestamp, reason));
                }
            },
            Event::Signal(_) | Event::Fill(_) => {}
        }
    }
}
