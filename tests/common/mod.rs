#![allow(dead_code)]

use alphamint::domain::bar::Bar;
use alphamint::domain::config::SimulationConfig;
use alphamint::domain::error::AlphaMintError;
use alphamint::domain::event::SignalKind;
use alphamint::domain::feed::SymbolSeries;
use alphamint::domain::strategy::ScriptedSignal;
use alphamint::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphaMintError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(AlphaMintError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.trading_day() >= start_date && b.trading_day() <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AlphaMintError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlphaMintError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(AlphaMintError::Data {
                reason: reason.clone(),
            });
        }
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(Bar::trading_day).min().unwrap();
                let max = bars.iter().map(Bar::trading_day).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Flat bar: open, high, low and close all at `close`.
pub fn make_bar(symbol: &str, date: &str, close: f64) -> Bar {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    Bar::daily(symbol, date, close, close, close, close, 100_000)
}

/// One bar per calendar day starting at `start_date`, closing at each of `closes`.
pub fn bars_from_closes(symbol: &str, start_date: &str, closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            Bar::daily(
                symbol,
                start + chrono::Duration::days(i as i64),
                close,
                close,
                close,
                close,
                100_000,
            )
        })
        .collect()
}

pub fn series(symbol: &str, start_date: &str, closes: &[f64]) -> SymbolSeries {
    SymbolSeries::new(symbol, bars_from_closes(symbol, start_date, closes))
}

pub fn scripted(date: &str, symbol: &str, kind: SignalKind) -> ScriptedSignal {
    ScriptedSignal {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        symbol: symbol.to_string(),
        kind,
        strength: 1.0,
    }
}

/// Default parameters with every risk rule disabled.
pub fn no_risk_config() -> SimulationConfig {
    let mut config = SimulationConfig::default();
    config.portfolio.risk.stop_loss = 0.0;
    config.portfolio.risk.trailing_stop = 0.0;
    config.portfolio.risk.take_profit = 0.0;
    config
}

pub const SAMPLE_INI: &str = r#"
[backtest]
initial_capital = 100000
start_date = 2024-01-01
end_date = 2024-12-31
codes = 600036,00700

[portfolio]
allow_short = false
buy_fraction = 0.2
sell_fraction = 0.2
max_single_position = 0.2

[risk]
stop_loss = 0.1
trailing_stop = 0.15
take_profit = 0.3

[domestic]
commission_rate = 0.0003
min_commission = 5
stamp_duty_rate = 0.0005
transfer_fee_rate = 0.00001
lot_size = 100

[cross_border]
exchange_rate = 0.92
fx_slippage = 0.002
commission_rate = 0.0003
min_commission = 5
stamp_duty_rate = 0.001
stamp_rounding_unit = 1
regulatory_fee_rate = 0.000085

[logging]
level = warn
"#;
