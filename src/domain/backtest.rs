//! Backtest session: wires the portfolio, execution router and a strategy onto one
//! event bus and steps a [`MarketFeed`] through it.
//!
//! Registration order fixes dispatch order: a Market event reaches the strategy first,
//! then the portfolio (price update and risk checks), then the router (price cache).

use chrono::NaiveDate;
use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::config::SimulationConfig;
use super::error::BusError;
use super::event::{Event, EventKind, MarketEvent};
use super::event_bus::{EventBus, SharedHandler};
use super::execution::ExecutionRouter;
use super::feed::{MarketFeed, Tick};
use super::portfolio::{EquitySnapshot, Portfolio, TradeRecord};
use super::position::Position;
use super::strategy::{Strategy, StrategyHandler};

/// Final state of a finished backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_cash: f64,
    pub final_cash: f64,
    pub final_equity: f64,
    pub equity_history: Vec<EquitySnapshot>,
    pub trades: Vec<TradeRecord>,
    pub positions: BTreeMap<String, Position>,
    pub latest_prices: BTreeMap<String, f64>,
    pub ticks_processed: usize,
    pub events_processed: usize,
}

pub struct BacktestSession<S: Strategy + 'static> {
    bus: EventBus,
    portfolio: Rc<RefCell<Portfolio>>,
    router: Rc<RefCell<ExecutionRouter>>,
    strategy: Rc<RefCell<StrategyHandler<S>>>,
    current_day: Option<NaiveDate>,
    ticks_processed: usize,
    events_processed: usize,
}

impl<S: Strategy + 'static> BacktestSession<S> {
    pub fn new(config: &SimulationConfig, strategy: S) -> Self {
        let portfolio = Rc::new(RefCell::new(Portfolio::from_simulation(config)));
        let router = Rc::new(RefCell::new(ExecutionRouter::new(config)));
        let strategy = Rc::new(RefCell::new(StrategyHandler::new(strategy)));

        let mut bus = EventBus::new();
        let portfolio_handler: SharedHandler = portfolio.clone();
        let router_handler: SharedHandler = router.clone();
        let strategy_handler: SharedHandler = strategy.clone();
        bus.register(EventKind::Market, strategy_handler);
        bus.register(EventKind::Market, portfolio_handler.clone());
        bus.register(EventKind::Market, router_handler.clone());
        bus.register(EventKind::Signal, portfolio_handler.clone());
        bus.register(EventKind::Order, router_handler);
        bus.register(EventKind::Fill, portfolio_handler);

        BacktestSession {
            bus,
            portfolio,
            router,
            strategy,
            current_day: None,
            ticks_processed: 0,
            events_processed: 0,
        }
    }

    pub fn portfolio(&self) -> Ref<'_, Portfolio> {
        self.portfolio.borrow()
    }

    pub fn router(&self) -> Ref<'_, ExecutionRouter> {
        self.router.borrow()
    }

    pub fn strategy(&self) -> Ref<'_, StrategyHandler<S>> {
        self.strategy.borrow()
    }

    /// Queues an event from outside the feed, e.g. a manual signal. Processed by the
    /// next [`BacktestSession::drain`] or [`BacktestSession::step`].
    pub fn publish(&mut self, event: impl Into<Event>) {
        self.bus.publish(event);
    }

    pub fn drain(&mut self) -> Result<usize, BusError> {
        let processed = self.bus.drain()?;
        self.events_processed += processed;
        Ok(processed)
    }

    /// Settles positions if `day` starts a new trading day.
    fn roll_day(&mut self, day: NaiveDate) {
        if self.current_day.is_some_and(|current| current != day) {
            tracing::debug!(%day, "settling positions for new trading day");
            self.portfolio.borrow_mut().settle();
        }
        self.current_day = Some(day);
    }

    /// Publishes one Market event per bar of `tick` and drains everything they cascade
    /// into. Returns the number of events processed.
    pub fn step(&mut self, tick: &Tick) -> Result<usize, BusError> {
        self.roll_day(tick.trading_day());
        for bar in &tick.bars {
            self.bus.publish(MarketEvent::new(bar.clone()));
        }
        let processed = self.drain()?;
        self.ticks_processed += 1;
        Ok(processed)
    }

    pub fn run(&mut self, feed: &MarketFeed) -> Result<BacktestResult, BusError> {
        tracing::info!(
            ticks = feed.len(),
            symbols = feed.symbols().len(),
            "backtest started"
        );
        for tick in feed.ticks() {
            self.step(tick)?;
        }
        let result = self.result();
        tracing::info!(
            ticks = result.ticks_processed,
            events = result.events_processed,
            trades = result.trades.len(),
            final_equity = result.final_equity,
            "backtest finished"
        );
        Ok(result)
    }

    pub fn result(&self) -> BacktestResult {
        let portfolio = self.portfolio.borrow();
        BacktestResult {
            initial_cash: portfolio.config().initial_cash,
            final_cash: portfolio.cash(),
            final_equity: portfolio.total_equity(),
            equity_history: portfolio.equity_history().to_vec(),
            trades: portfolio.trades().to_vec(),
            positions: portfolio
                .positions()
                .iter()
                .map(|(symbol, pos)| (symbol.clone(), pos.clone()))
                .collect(),
            latest_prices: portfolio
                .latest_prices()
                .iter()
                .map(|(symbol, price)| (symbol.clone(), *price))
                .collect(),
            ticks_processed: self.ticks_processed,
            events_processed: self.events_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::event::{Direction, SignalEvent, SignalKind};
    use crate::domain::feed::SymbolSeries;
    use crate::domain::risk::RiskRule;
    use crate::domain::strategy::{ScriptedSignal, ScriptedStrategy};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn bar(symbol: &str, d: u32, close: f64) -> Bar {
        Bar::daily(symbol, date(d), close, close, close, close, 10_000)
    }

    fn signal(symbol: &str, d: u32, kind: SignalKind) -> ScriptedSignal {
        ScriptedSignal {
            date: date(d),
            symbol: symbol.to_string(),
            kind,
            strength: 1.0,
        }
    }

    #[test]
    fn long_signal_becomes_position_within_one_step() {
        let config = SimulationConfig::default();
        let strategy = ScriptedStrategy::new(vec![signal("600036", 2, SignalKind::Long)]);
        let mut session = BacktestSession::new(&config, strategy);

        let tick = Tick {
            timestamp: bar("600036", 2, 10.0).timestamp,
            bars: vec![bar("600036", 2, 10.0)],
        };
        // Market, Signal, Order, Fill
        assert_eq!(session.step(&tick).unwrap(), 4);

        let portfolio = session.portfolio();
        let pos = portfolio.position("600036").unwrap();
        assert_eq!(pos.total_quantity(), 2000);
        assert_eq!(pos.available_quantity(), 0);
        assert_eq!(portfolio.locked_cash(), 0.0);
        assert_eq!(portfolio.trades().len(), 1);
    }

    #[test]
    fn new_day_settles_before_dispatch() {
        let config = SimulationConfig::default();
        let strategy = ScriptedStrategy::new(vec![
            signal("600036", 2, SignalKind::Long),
            signal("600036", 3, SignalKind::Exit),
        ]);
        let series = SymbolSeries::new("600036", vec![bar("600036", 2, 10.0), bar("600036", 3, 10.5)]);
        let mut session = BacktestSession::new(&config, strategy);
        let result = session.run(&MarketFeed::new(&[series])).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[1].direction, Direction::Sell);
        assert_eq!(result.trades[1].quantity, 2000);
        assert!(result.positions["600036"].is_flat());
        assert_eq!(result.ticks_processed, 2);
        assert_eq!(result.equity_history.len(), 2);
    }

    #[test]
    fn same_day_exit_is_not_executed() {
        let config = SimulationConfig::default();
        let mut session = BacktestSession::new(
            &config,
            ScriptedStrategy::new(vec![signal("600036", 2, SignalKind::Long)]),
        );
        let morning = Tick {
            timestamp: date(2).and_hms_opt(9, 30, 0).unwrap(),
            bars: vec![bar("600036", 2, 10.0)],
        };
        session.step(&morning).unwrap();

        session.publish(SignalEvent::new(
            "600036",
            date(2).and_hms_opt(14, 0, 0).unwrap(),
            SignalKind::Exit,
        ));
        // Only the signal: no sellable shares yet, so no order.
        assert_eq!(session.drain().unwrap(), 1);
        assert_eq!(session.portfolio().trades().len(), 1);
    }

    #[test]
    fn stop_loss_exit_completes_in_one_drain() {
        let config = SimulationConfig::default();
        let strategy = ScriptedStrategy::new(vec![signal("600036", 2, SignalKind::Long)]);
        let series = SymbolSeries::new(
            "600036",
            vec![bar("600036", 2, 10.0), bar("600036", 3, 10.0), bar("600036", 4, 8.5)],
        );
        let mut session = BacktestSession::new(&config, strategy);
        let result = session.run(&MarketFeed::new(&[series])).unwrap();

        let exit = result.trades.last().unwrap();
        assert_eq!(exit.direction, Direction::Sell);
        assert_eq!(exit.quantity, 2000);
        assert_eq!(exit.exit_rule, Some(RiskRule::StopLoss));
        assert!(result.positions["600036"].is_flat());
    }

    #[test]
    fn signals_for_unpriced_symbols_are_dropped() {
        let config = SimulationConfig::default();
        let mut session = BacktestSession::new(&config, ScriptedStrategy::default());
        session.publish(SignalEvent::new(
            "600036",
            date(2).and_hms_opt(0, 0, 0).unwrap(),
            SignalKind::Long,
        ));
        assert_eq!(session.drain().unwrap(), 1);
        assert!(session.portfolio().positions().is_empty());
        assert!(session.router().domestic().prices().is_empty());
        assert_eq!(session.strategy().signals_emitted(), 0);
    }
}
