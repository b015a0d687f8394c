//! Historical bar representation.

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Daily bar stamped at midnight of `date`.
    pub fn daily(
        symbol: &str,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Bar {
            symbol: symbol.to_string(),
            timestamp: date.and_time(chrono::NaiveTime::MIN),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Calendar day the bar belongs to; settlement boundaries follow this.
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// A close that can be traded or marked at: finite and strictly positive.
    pub fn has_tradable_close(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}
