//! Portfolio and risk manager.
//!
//! Turns signals into validated orders, reserves cash or shares for every order it
//! publishes, applies fills to positions and the cash ledger, and raises risk exits on
//! price updates. All money amounts are in the base currency; latest prices are stored as
//! quoted and converted through the [`PriceConverter`] when valued.

use chrono::NaiveDateTime;
use std::collections::HashMap;

use super::config::{PortfolioConfig, SimulationConfig};
use super::error::OrderRejection;
use super::event::{
    Direction, Event, FillEvent, FillStatus, MarketEvent, OrderEvent, OrderId, SignalEvent,
    SignalKind, SignalOrigin,
};
use super::event_bus::{EventHandler, Outbox};
use super::market::PriceConverter;
use super::position::Position;
use super::risk::{RiskRule, drawdown_from_peak, evaluate_risk_exit};

/// Tolerance for the position cap comparison.
const CAP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct EquitySnapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub market_value: f64,
    pub total_equity: f64,
}

/// One row of the trade log.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp: NaiveDateTime,
    pub order_id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub quantity: i64,
    pub price: f64,
    pub cost: f64,
    /// Set only for trades that closed (part of) a position.
    pub realized_pnl: Option<f64>,
    /// Gross price return of the closed shares against their average cost, before costs.
    pub price_return: Option<f64>,
    pub cash_before: f64,
    pub cash_after: f64,
    pub exit_rule: Option<RiskRule>,
}

impl TradeRecord {
    pub fn is_closing(&self) -> bool {
        self.realized_pnl.is_some()
    }
}

/// What an outstanding order holds back until its fill (or rejection) arrives.
#[derive(Debug, Clone, PartialEq)]
struct Reservation {
    symbol: String,
    cash: f64,
    shares: i64,
    exit_rule: Option<RiskRule>,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    config: PortfolioConfig,
    converter: PriceConverter,
    cash: f64,
    locked_cash: f64,
    positions: HashMap<String, Position>,
    high_water_marks: HashMap<String, f64>,
    latest_prices: HashMap<String, f64>,
    reservations: HashMap<OrderId, Reservation>,
    next_order_id: OrderId,
    equity_history: Vec<EquitySnapshot>,
    trades: Vec<TradeRecord>,
}

impl Portfolio {
    pub fn new(config: PortfolioConfig, converter: PriceConverter) -> Self {
        Portfolio {
            cash: config.initial_cash,
            config,
            converter,
            locked_cash: 0.0,
            positions: HashMap::new(),
            high_water_marks: HashMap::new(),
            latest_prices: HashMap::new(),
            reservations: HashMap::new(),
            next_order_id: 1,
            equity_history: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn from_simulation(config: &SimulationConfig) -> Self {
        Self::new(config.portfolio.clone(), config.price_converter())
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn locked_cash(&self) -> f64 {
        self.locked_cash
    }

    pub fn available_cash(&self) -> f64 {
        self.cash - self.locked_cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> &HashMap<String, Position> {
        &self.positions
    }

    /// Latest quoted price for `symbol`.
    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.latest_prices.get(symbol).copied()
    }

    pub fn latest_prices(&self) -> &HashMap<String, f64> {
        &self.latest_prices
    }

    pub fn high_water_mark(&self, symbol: &str) -> Option<f64> {
        self.high_water_marks.get(symbol).copied()
    }

    pub fn equity_history(&self) -> &[EquitySnapshot] {
        &self.equity_history
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Orders published but not yet filled or rejected.
    pub fn open_orders(&self) -> usize {
        self.reservations.len()
    }

    /// Latest price for `symbol` converted into the base currency.
    fn base_price(&self, symbol: &str) -> Option<f64> {
        self.latest_price(symbol)
            .map(|quoted| self.converter.to_base(symbol, quoted))
    }

    pub fn market_value(&self) -> f64 {
        self.positions
            .values()
            .filter_map(|pos| {
                self.base_price(pos.symbol())
                    .map(|price| pos.market_value(price))
            })
            .sum()
    }

    pub fn total_equity(&self) -> f64 {
        self.cash + self.market_value()
    }

    /// T+1 unlock for every position.
    pub fn settle(&mut self) {
        for pos in self.positions.values_mut() {
            pos.settle();
        }
    }

    pub fn validate_buy(&self, symbol: &str, price: f64, quantity: i64) -> Result<(), OrderRejection> {
        if price <= 0.0 || !price.is_finite() {
            return Err(OrderRejection::InvalidPrice {
                symbol: symbol.to_string(),
                price,
            });
        }
        if quantity <= 0 {
            return Err(OrderRejection::InvalidQuantity {
                symbol: symbol.to_string(),
                quantity,
            });
        }

        let required = quantity as f64 * price;
        let available = self.available_cash();
        if required > available {
            return Err(OrderRejection::InsufficientCash {
                symbol: symbol.to_string(),
                required,
                available,
            });
        }

        let held = self
            .position(symbol)
            .map_or(0, |pos| pos.total_quantity().max(0));
        let target_value = (held + quantity) as f64 * price;
        let equity = self.total_equity();
        let cap = self.config.sizing.max_single_position;
        if equity <= 0.0 || target_value > cap * equity * (1.0 + CAP_EPSILON) {
            return Err(OrderRejection::PositionCapExceeded {
                symbol: symbol.to_string(),
                target_fraction: if equity > 0.0 {
                    target_value / equity
                } else {
                    f64::INFINITY
                },
                cap,
            });
        }
        Ok(())
    }

    pub fn validate_sell(&self, symbol: &str, quantity: i64) -> Result<(), OrderRejection> {
        if quantity <= 0 {
            return Err(OrderRejection::InvalidQuantity {
                symbol: symbol.to_string(),
                quantity,
            });
        }
        let pos = self.position(symbol);
        let shorting = self.config.allow_short && pos.is_none_or(|p| !p.is_long());
        if shorting {
            return Ok(());
        }
        let sellable = pos.map_or(0, Position::sellable_quantity);
        if sellable < quantity {
            return Err(OrderRejection::InsufficientShares {
                symbol: symbol.to_string(),
                requested: quantity,
                available: sellable,
            });
        }
        Ok(())
    }

    /// Sizes, validates and reserves an order for `signal`.
    ///
    /// `Ok(None)` means there was nothing to do (no price yet, nothing to sell).
    pub fn create_order(
        &mut self,
        signal: &SignalEvent,
    ) -> Result<Option<OrderEvent>, OrderRejection> {
        let symbol = signal.symbol.as_str();
        let Some(price) = self.base_price(symbol) else {
            tracing::warn!(symbol, "signal dropped: no price seen yet");
            return Ok(None);
        };
        let strength = if signal.strength.is_finite() {
            signal.strength.clamp(0.0, 1.0)
        } else {
            1.0
        };
        let exit_rule = match signal.origin {
            SignalOrigin::Risk(rule) => Some(rule),
            SignalOrigin::Strategy => None,
        };
        let lot = self.config.lot_size;
        let (total, sellable) = self
            .position(symbol)
            .map_or((0, 0), |p| (p.total_quantity(), p.sellable_quantity()));

        let (direction, quantity) = match signal.kind {
            SignalKind::Exit if total > 0 => {
                if sellable == 0 {
                    tracing::debug!(symbol, "exit skipped: no sellable shares");
                    return Ok(None);
                }
                self.validate_sell(symbol, sellable)?;
                (Direction::Sell, sellable)
            }
            SignalKind::Exit if total < 0 => {
                let cover = -total;
                self.validate_cover(symbol, price, cover)?;
                (Direction::Buy, cover)
            }
            SignalKind::Exit => {
                tracing::debug!(symbol, "exit skipped: no position");
                return Ok(None);
            }
            SignalKind::Long => {
                if strength <= 0.0 {
                    tracing::debug!(symbol, "long skipped: zero strength");
                    return Ok(None);
                }
                let quantity = self.size_entry(symbol, price, strength);
                self.validate_buy(symbol, price, quantity)?;
                (Direction::Buy, quantity)
            }
            SignalKind::Short if total > 0 => {
                let raw = round_to_lot((total as f64 * self.config.sizing.sell_fraction) as i64, lot);
                let sellable_lots = round_to_lot(sellable, lot);
                let mut quantity = raw.min(sellable_lots);
                if quantity == 0 && sellable_lots >= lot {
                    quantity = lot;
                }
                if quantity == 0 {
                    quantity = raw.max(lot);
                }
                self.validate_sell(symbol, quantity)?;
                (Direction::Sell, quantity)
            }
            SignalKind::Short if self.config.allow_short => {
                if strength <= 0.0 {
                    tracing::debug!(symbol, "short skipped: zero strength");
                    return Ok(None);
                }
                let quantity = self.size_entry(symbol, price, strength);
                self.validate_sell(symbol, quantity)?;
                (Direction::Sell, quantity)
            }
            SignalKind::Short => {
                tracing::debug!(symbol, "short skipped: nothing held and shorting disabled");
                return Ok(None);
            }
        };

        Ok(Some(self.on_order_accepted(symbol, quantity, direction, price, exit_rule)))
    }

    /// Entry size for a Long (or a short opened from flat): a fraction of available cash,
    /// at least one lot, clipped to the single-position cap.
    fn size_entry(&self, symbol: &str, price: f64, strength: f64) -> i64 {
        let lot = self.config.lot_size;
        let sizing = &self.config.sizing;
        let budget = self.available_cash() * sizing.buy_fraction * strength;
        let mut quantity = round_to_lot((budget / price).floor() as i64, lot);
        if quantity == 0 {
            // One lot; validation rejects it when even that is unaffordable.
            quantity = lot;
        }

        let held = self
            .position(symbol)
            .map_or(0, |p| p.total_quantity().abs());
        let headroom = sizing.max_single_position * self.total_equity() - held as f64 * price;
        let max_quantity = round_to_lot((headroom / price).floor().max(0.0) as i64, lot);
        // Below one lot of headroom the order is left as is so validation names the cap.
        if max_quantity >= lot {
            quantity = quantity.min(max_quantity);
        }
        quantity
    }

    fn validate_cover(&self, symbol: &str, price: f64, quantity: i64) -> Result<(), OrderRejection> {
        let required = quantity as f64 * price;
        let available = self.available_cash();
        if required > available {
            return Err(OrderRejection::InsufficientCash {
                symbol: symbol.to_string(),
                required,
                available,
            });
        }
        Ok(())
    }

    /// Assigns an id and reserves cash (buys) or shares (sells) for a validated order.
    pub fn on_order_accepted(
        &mut self,
        symbol: &str,
        quantity: i64,
        direction: Direction,
        price: f64,
        exit_rule: Option<RiskRule>,
    ) -> OrderEvent {
        let id = self.next_order_id;
        self.next_order_id += 1;

        let mut reservation = Reservation {
            symbol: symbol.to_string(),
            cash: 0.0,
            shares: 0,
            exit_rule,
        };
        match direction {
            Direction::Buy => {
                reservation.cash = quantity as f64 * price;
                self.locked_cash += reservation.cash;
            }
            Direction::Sell => {
                reservation.shares = quantity;
                let lot = self.config.lot_size;
                self.positions
                    .entry(symbol.to_string())
                    .or_insert_with(|| Position::new(symbol, lot))
                    .reserve_sell(quantity);
            }
        }
        self.reservations.insert(id, reservation);

        tracing::debug!(order_id = id, symbol, quantity, %direction, "order accepted");
        OrderEvent::market(id, symbol, quantity, direction)
    }

    /// Like [`Portfolio::create_order`], logging rejections instead of returning them.
    pub fn on_signal(&mut self, signal: &SignalEvent) -> Option<OrderEvent> {
        match self.create_order(signal) {
            Ok(order) => order,
            Err(rejection) => {
                tracing::warn!(%rejection, "signal rejected");
                None
            }
        }
    }

    pub fn on_fill(&mut self, fill: &FillEvent) {
        let reservation = self.release(fill.order_id);

        if let FillStatus::Rejected(reason) = &fill.status {
            tracing::warn!(order_id = fill.order_id, %reason, "order rejected by execution");
            return;
        }
        if fill.quantity <= 0 {
            tracing::debug!(order_id = fill.order_id, "empty fill ignored");
            return;
        }

        let exit_rule = reservation.and_then(|r| r.exit_rule);
        match fill.direction {
            Direction::Buy => self.apply_buy_fill(fill, exit_rule),
            Direction::Sell => self.apply_sell_fill(fill, exit_rule),
        }
    }

    fn release(&mut self, order_id: OrderId) -> Option<Reservation> {
        let Some(reservation) = self.reservations.remove(&order_id) else {
            tracing::warn!(order_id, "fill for an unknown order");
            return None;
        };
        self.locked_cash -= reservation.cash;
        if self.reservations.is_empty() || self.locked_cash < 0.0 {
            self.locked_cash = 0.0;
        }
        if reservation.shares > 0 {
            if let Some(pos) = self.positions.get_mut(&reservation.symbol) {
                pos.release_sell(reservation.shares);
            }
        }
        Some(reservation)
    }

    fn apply_buy_fill(&mut self, fill: &FillEvent, exit_rule: Option<RiskRule>) {
        let lot = self.config.lot_size;
        let pos = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::new(&fill.symbol, lot));
        let average_before = pos.average_cost();
        let short_before = (-pos.total_quantity()).max(0);

        let executed = pos.apply_buy(fill.quantity, fill.price);
        if executed == 0 {
            return;
        }
        let is_long = pos.is_long();
        let is_flat = pos.is_flat();

        let cost = fill.cost * executed as f64 / fill.quantity as f64;
        let cash_before = self.cash;
        self.cash -= executed as f64 * fill.price + cost;
        if self.cash < 0.0 {
            tracing::warn!(symbol = %fill.symbol, cash = self.cash, "cash overdrawn after buy fill");
        }

        let covered = executed.min(short_before);
        let (realized_pnl, price_return) = if covered > 0 {
            let pnl = (average_before - fill.price) * covered as f64 - cost;
            (Some(pnl), price_change(average_before, fill.price).map(|r| -r))
        } else {
            (None, None)
        };

        if is_long {
            let mark = self.high_water_marks.entry(fill.symbol.clone()).or_insert(fill.price);
            *mark = mark.max(fill.price);
        } else if is_flat {
            self.high_water_marks.remove(&fill.symbol);
        }

        self.record_trade(fill, executed, cost, realized_pnl, price_return, cash_before, exit_rule);
    }

    fn apply_sell_fill(&mut self, fill: &FillEvent, exit_rule: Option<RiskRule>) {
        let allow_short = self.config.allow_short;
        if !allow_short && !self.positions.contains_key(&fill.symbol) {
            tracing::warn!(symbol = %fill.symbol, "sell fill without a position ignored");
            return;
        }
        let lot = self.config.lot_size;
        let pos = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::new(&fill.symbol, lot));
        let average_before = pos.average_cost();
        let long_before = pos.total_quantity().max(0);

        let executed = pos.apply_sell(fill.quantity, fill.price, allow_short);
        if executed == 0 {
            tracing::warn!(symbol = %fill.symbol, requested = fill.quantity, "sell fill had nothing to sell");
            return;
        }
        let is_long = pos.is_long();

        let cost = fill.cost * executed as f64 / fill.quantity as f64;
        let cash_before = self.cash;
        self.cash += executed as f64 * fill.price - cost;
        if self.cash < 0.0 {
            tracing::warn!(symbol = %fill.symbol, cash = self.cash, "cash overdrawn after sell fill");
        }

        let closed = executed.min(long_before);
        let (realized_pnl, price_return) = if closed > 0 {
            let pnl = (fill.price - average_before) * closed as f64 - cost;
            (Some(pnl), price_change(average_before, fill.price))
        } else {
            (None, None)
        };

        if !is_long {
            self.high_water_marks.remove(&fill.symbol);
        }

        self.record_trade(fill, executed, cost, realized_pnl, price_return, cash_before, exit_rule);
    }

    #[allow(clippy::too_many_arguments)]
    fn record_trade(
        &mut self,
        fill: &FillEvent,
        quantity: i64,
        cost: f64,
        realized_pnl: Option<f64>,
        price_return: Option<f64>,
        cash_before: f64,
        exit_rule: Option<RiskRule>,
    ) {
        self.trades.push(TradeRecord {
            timestamp: fill.timestamp,
            order_id: fill.order_id,
            symbol: fill.symbol.clone(),
            direction: fill.direction,
            quantity,
            price: fill.price,
            cost,
            realized_pnl,
            price_return,
            cash_before,
            cash_after: self.cash,
            exit_rule,
        });
    }

    /// Stores the price, evaluates risk exits and records an equity snapshot.
    /// Returns the exit signal of the first risk rule that fired, if any.
    ///
    /// An untradable close is missing data: the previous price is kept for valuation
    /// and no risk rule is evaluated against it.
    pub fn on_market_update(&mut self, event: &MarketEvent) -> Option<SignalEvent> {
        let symbol = event.symbol();
        if !event.has_tradable_price() {
            tracing::warn!(symbol, close = event.close(), "untradable close ignored");
            self.record_equity(event.timestamp());
            return None;
        }
        self.latest_prices.insert(symbol.to_string(), event.close());
        let exit = self.check_risk(symbol, event.timestamp());
        self.record_equity(event.timestamp());
        exit
    }

    fn check_risk(&mut self, symbol: &str, timestamp: NaiveDateTime) -> Option<SignalEvent> {
        let price = self.base_price(symbol)?;
        let pos = self.positions.get(symbol)?;
        let unrealized = pos.unrealized_return(price)?;

        let drawdown = if pos.is_long() {
            let mark = self
                .high_water_marks
                .entry(symbol.to_string())
                .or_insert(price);
            *mark = mark.max(price);
            Some(drawdown_from_peak(*mark, price))
        } else {
            None
        };

        let rule = evaluate_risk_exit(&self.config.risk, unrealized, drawdown)?;
        if pos.is_long() && pos.sellable_quantity() == 0 {
            tracing::debug!(symbol, %rule, "risk exit deferred: no sellable shares");
            return None;
        }
        tracing::info!(symbol, %rule, price, unrealized, "risk exit triggered");
        Some(SignalEvent::risk_exit(symbol, timestamp, rule))
    }

    fn record_equity(&mut self, timestamp: NaiveDateTime) {
        let market_value = self.market_value();
        self.equity_history.push(EquitySnapshot {
            timestamp,
            cash: self.cash,
            market_value,
            total_equity: self.cash + market_value,
        });
    }
}

impl EventHandler for Portfolio {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox<'_>) {
        match event {
            Event::Market(market) => {
                if let Some(signal) = self.on_market_update(market) {
                    outbox.publish(signal);
                }
            }
            Event::Signal(signal) => {
                if let Some(order) = self.on_signal(signal) {
                    outbox.publish(order);
                }
            }
            Event::Fill(fill) => self.on_fill(fill),
            Event::Order(_) => {}
        }
    }
}

fn round_to_lot(quantity: i64, lot: i64) -> i64 {
    if lot <= 0 {
        return quantity.max(0);
    }
    quantity.max(0) / lot * lot
}

/// `(price - average) / average`, when there is a cost basis to compare against.
fn price_change(average: f64, price: f64) -> Option<f64> {
    (average > 0.0).then(|| (price - average) / average)
}
