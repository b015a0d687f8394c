//! Event model: the only values that cross component boundaries.
//!
//! Every event is a plain owned value. Handlers receive `&Event` and publish new
//! events rather than mutating what they were given.

use chrono::NaiveDateTime;
use std::fmt;

use super::bar::Bar;
use super::error::ExecutionError;
use super::risk::RiskRule;

/// Identifier the portfolio assigns to each order it publishes.
pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Market,
    Signal,
    Order,
    Fill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Long,
    Short,
    Exit,
}

impl SignalKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" => Some(SignalKind::Long),
            "SHORT" => Some(SignalKind::Short),
            "EXIT" => Some(SignalKind::Exit),
            _ => None,
        }
    }
}

/// Who raised a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOrigin {
    Strategy,
    Risk(RiskRule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Direction::Buy),
            "SELL" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
}

/// New bar for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub bar: Bar,
}

impl MarketEvent {
    pub fn new(bar: Bar) -> Self {
        MarketEvent { bar }
    }

    pub fn symbol(&self) -> &str {
        &self.bar.symbol
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }

    pub fn has_tradable_price(&self) -> bool {
        self.bar.has_tradable_close()
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.bar.timestamp
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub kind: SignalKind,
    /// Sizing weight in `[0, 1]`; 1.0 unless the strategy says otherwise.
    pub strength: f64,
    pub origin: SignalOrigin,
}

impl SignalEvent {
    pub fn new(symbol: &str, timestamp: NaiveDateTime, kind: SignalKind) -> Self {
        SignalEvent {
            symbol: symbol.to_string(),
            timestamp,
            kind,
            strength: 1.0,
            origin: SignalOrigin::Strategy,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn risk_exit(symbol: &str, timestamp: NaiveDateTime, rule: RiskRule) -> Self {
        SignalEvent {
            origin: SignalOrigin::Risk(rule),
            ..SignalEvent::new(symbol, timestamp, SignalKind::Exit)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderEvent {
    pub id: OrderId,
    pub symbol: String,
    pub kind: OrderKind,
    pub quantity: i64,
    pub direction: Direction,
}

impl OrderEvent {
    pub fn market(id: OrderId, symbol: &str, quantity: i64, direction: Direction) -> Self {
        OrderEvent {
            id,
            symbol: symbol.to_string(),
            kind: OrderKind::Market,
            quantity,
            direction,
        }
    }
}

/// Itemised transaction costs of a fill, in the base currency.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CostBreakdown {
    pub commission: f64,
    pub tax: f64,
    /// Transfer fee (domestic) or regulatory levies (cross-border).
    pub transfer_fee: f64,
    pub fx_cost: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.commission + self.tax + self.transfer_fee + self.fx_cost
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FillStatus {
    Filled,
    Rejected(ExecutionError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    pub order_id: OrderId,
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub quantity: i64,
    pub direction: Direction,
    /// Executed price in the base currency.
    pub price: f64,
    /// Total transaction cost, `costs.total()`.
    pub cost: f64,
    pub costs: CostBreakdown,
    pub status: FillStatus,
}

impl FillEvent {
    /// A completed fill whose whole cost is booked as commission.
    pub fn new(
        order_id: OrderId,
        symbol: &str,
        timestamp: NaiveDateTime,
        quantity: i64,
        direction: Direction,
        price: f64,
        cost: f64,
    ) -> Self {
        Self::with_costs(
            order_id,
            symbol,
            timestamp,
            quantity,
            direction,
            price,
            CostBreakdown {
                commission: cost,
                ..CostBreakdown::default()
            },
        )
    }

    pub fn with_costs(
        order_id: OrderId,
        symbol: &str,
        timestamp: NaiveDateTime,
        quantity: i64,
        direction: Direction,
        price: f64,
        costs: CostBreakdown,
    ) -> Self {
        FillEvent {
            order_id,
            symbol: symbol.to_string(),
            timestamp,
            quantity,
            direction,
            price,
            cost: costs.total(),
            costs,
            status: FillStatus::Filled,
        }
    }

    /// Zero-quantity fill that only tells the portfolio to release the order's reservation.
    pub fn rejected(order: &OrderEvent, timestamp: NaiveDateTime, reason: ExecutionError) -> Self {
        FillEvent {
            order_id: order.id,
            symbol: order.symbol.clone(),
            timestamp,
            quantity: 0,
            direction: order.direction,
            price: 0.0,
            cost: 0.0,
            costs: CostBreakdown::default(),
            status: FillStatus::Rejected(reason),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, FillStatus::Rejected(_))
    }

    pub fn trade_value(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Market(MarketEvent),
    Signal(SignalEvent),
    Order(OrderEvent),
    Fill(FillEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Market(_) => EventKind::Market,
            Event::Signal(_) => EventKind::Signal,
            Event::Order(_) => EventKind::Order,
            Event::Fill(_) => EventKind::Fill,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Event::Market(e) => e.symbol(),
            Event::Signal(e) => &e.symbol,
            Event::Order(e) => &e.symbol,
            Event::Fill(e) => &e.symbol,
        }
    }
}

impl From<MarketEvent> for Event {
    fn from(e: MarketEvent) -> Self {
        Event::Market(e)
    }
}

impl From<SignalEvent> for Event {
    fn from(e: SignalEvent) -> Self {
        Event::Signal(e)
    }
}

impl From<OrderEvent> for Event {
    fn from(e: OrderEvent) -> Self {
        Event::Order(e)
    }
}

impl From<FillEvent> for Event {
    fn from(e: FillEvent) -> Self {
        Event::Fill(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn event_kind_matches_variant() {
        let bar = Bar::daily("600036", ts().date(), 1.0, 1.0, 1.0, 1.0, 0);
        assert_eq!(Event::from(MarketEvent::new(bar)).kind(), EventKind::Market);
        let signal = SignalEvent::new("600036", ts(), SignalKind::Long);
        assert_eq!(Event::from(signal).kind(), EventKind::Signal);
        let order = OrderEvent::market(1, "600036", 100, Direction::Buy);
        assert_eq!(Event::from(order).kind(), EventKind::Order);
        let fill = FillEvent::new(1, "600036", ts(), 100, Direction::Buy, 10.0, 5.0);
        assert_eq!(Event::from(fill).kind(), EventKind::Fill);
    }

    #[test]
    fn signal_defaults_to_full_strength_from_strategy() {
        let signal = SignalEvent::new("000001", ts(), SignalKind::Long);
        assert_eq!(signal.strength, 1.0);
        assert_eq!(signal.origin, SignalOrigin::Strategy);
    }

    #[test]
    fn risk_exit_signal_records_rule() {
        let signal = SignalEvent::risk_exit("000001", ts(), RiskRule::StopLoss);
        assert_eq!(signal.kind, SignalKind::Exit);
        assert_eq!(signal.origin, SignalOrigin::Risk(RiskRule::StopLoss));
    }

    #[test]
    fn fill_cost_is_breakdown_total() {
        let costs = CostBreakdown {
            commission: 5.0,
            tax: 5.5,
            transfer_fee: 0.11,
            fx_cost: 0.0,
        };
        let fill = FillEvent::with_costs(7, "000001", ts(), 1000, Direction::Sell, 11.0, costs);
        assert!((fill.cost - 10.61).abs() < 1e-9);
        assert!((fill.trade_value() - 11_000.0).abs() < f64::EPSILON);
        assert!(!fill.is_rejected());
    }

    #[test]
    fn rejected_fill_carries_nothing_but_the_order_id() {
        let order = OrderEvent::market(9, "000001", 150, Direction::Buy);
        let reason = ExecutionError::LotSizeViolation {
            symbol: "000001".into(),
            quantity: 150,
            lot_size: 100,
        };
        let fill = FillEvent::rejected(&order, ts(), reason);
        assert_eq!(fill.order_id, 9);
        assert_eq!(fill.quantity, 0);
        assert_eq!(fill.cost, 0.0);
        assert!(fill.is_rejected());
    }

    #[test]
    fn parse_signal_and_direction_case_insensitive() {
        assert_eq!(SignalKind::parse("long"), Some(SignalKind::Long));
        assert_eq!(SignalKind::parse(" EXIT "), Some(SignalKind::Exit));
        assert_eq!(SignalKind::parse("hold"), None);
        assert_eq!(Direction::parse("sell"), Some(Direction::Sell));
        assert_eq!(Direction::Buy.to_string(), "BUY");
    }
}
