//! Per-symbol bar series and the merged tick timeline that drives a backtest.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::bar::Bar;

#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolSeries {
    /// Sorts `bars` by timestamp. When several bars share a day the index points at the
    /// first one.
    pub fn new(symbol: &str, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        let mut date_index = HashMap::new();
        for (i, bar) in bars.iter().enumerate() {
            date_index.entry(bar.trading_day()).or_insert(i);
        }
        SymbolSeries {
            symbol: symbol.to_string(),
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&Bar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(Bar::trading_day)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(Bar::trading_day)
    }
}

/// All bars sharing one timestamp, in configured symbol order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub timestamp: NaiveDateTime,
    pub bars: Vec<Bar>,
}

impl Tick {
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketFeed {
    symbols: Vec<String>,
    ticks: Vec<Tick>,
}

impl MarketFeed {
    pub fn new(series: &[SymbolSeries]) -> Self {
        let mut by_time: BTreeMap<NaiveDateTime, Vec<Bar>> = BTreeMap::new();
        for s in series {
            for bar in &s.bars {
                by_time.entry(bar.timestamp).or_default().push(bar.clone());
            }
        }
        MarketFeed {
            symbols: series.iter().map(|s| s.symbol.clone()).collect(),
            ticks: by_time
                .into_iter()
                .map(|(timestamp, bars)| Tick { timestamp, bars })
                .collect(),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn bar_count(&self) -> usize {
        self.ticks.iter().map(|t| t.bars.len()).sum()
    }

    /// Distinct trading days, ascending.
    pub fn trading_days(&self) -> Vec<NaiveDate> {
        let days: BTreeSet<NaiveDate> = self.ticks.iter().map(Tick::trading_day).collect();
        days.into_iter().collect()
    }
}
