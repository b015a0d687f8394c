//! Strategy contract: strategies consume market events and may answer with a signal.
//!
//! Signal generation itself lives outside this crate. [`ScriptedStrategy`] replays
//! signals computed elsewhere so the kernel can be driven end to end.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::event::{Event, MarketEvent, SignalEvent, SignalKind};
use super::event_bus::{EventHandler, Outbox};

pub trait Strategy {
    fn on_market(&mut self, event: &MarketEvent) -> Option<SignalEvent>;

    fn name(&self) -> &str {
        "strategy"
    }
}

/// Puts a [`Strategy`] on the bus: Market events in, Signal events out.
pub struct StrategyHandler<S> {
    strategy: S,
    signals_emitted: usize,
}

impl<S: Strategy> StrategyHandler<S> {
    pub fn new(strategy: S) -> Self {
        StrategyHandler {
            strategy,
            signals_emitted: 0,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn signals_emitted(&self) -> usize {
        self.signals_emitted
    }
}

impl<S: Strategy> EventHandler for StrategyHandler<S> {
    fn handle(&mut self, event: &Event, outbox: &mut Outbox<'_>) {
        let Event::Market(market) = event else {
            return;
        };
        if let Some(signal) = self.strategy.on_market(market) {
            tracing::debug!(
                strategy = self.strategy.name(),
                symbol = %signal.symbol,
                kind = ?signal.kind,
                "signal"
            );
            self.signals_emitted += 1;
            outbox.publish(signal);
        }
    }
}

/// A precomputed signal for one symbol on one trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedSignal {
    pub date: NaiveDate,
    pub symbol: String,
    pub kind: SignalKind,
    pub strength: f64,
}

/// Emits each scripted signal once, on the first bar of its day for its symbol.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    pending: HashMap<(NaiveDate, String), (SignalKind, f64)>,
}

impl ScriptedStrategy {
    pub fn new(signals: impl IntoIterator<Item = ScriptedSignal>) -> Self {
        let mut pending = HashMap::new();
        for signal in signals {
            let key = (signal.date, signal.symbol.clone());
            if pending.insert(key, (signal.kind, signal.strength)).is_some() {
                tracing::warn!(
                    symbol = %signal.symbol,
                    date = %signal.date,
                    "duplicate scripted signal, keeping the last one"
                );
            }
        }
        ScriptedStrategy { pending }
    }

    /// Signals not replayed yet.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl Strategy for ScriptedStrategy {
    fn on_market(&mut self, event: &MarketEvent) -> Option<SignalEvent> {
        let key = (event.bar.trading_day(), event.symbol().to_string());
        let (kind, strength) = self.pending.remove(&key)?;
        Some(SignalEvent::new(event.symbol(), event.timestamp(), kind).with_strength(strength))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
