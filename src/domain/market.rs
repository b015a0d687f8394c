//! Market classification of symbol codes.
//!
//! Domestic A-share codes are six digits; cross-border (Stock Connect) codes are five.
//! Everything that is not five characters long is treated as domestic.

use std::fmt;

const CROSS_BORDER_CODE_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Domestic,
    CrossBorder,
}

impl Market {
    pub fn classify(symbol: &str) -> Market {
        if symbol.chars().count() == CROSS_BORDER_CODE_LEN {
            Market::CrossBorder
        } else {
            Market::Domestic
        }
    }

    pub fn quote_currency(&self) -> &'static str {
        match self {
            Market::Domestic => "CNY",
            Market::CrossBorder => "HKD",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Domestic => f.write_str("domestic"),
            Market::CrossBorder => f.write_str("cross-border"),
        }
    }
}

/// Converts quoted prices into the account's base currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceConverter {
    /// Base-currency units per cross-border quote unit.
    pub cross_border_rate: f64,
}

impl PriceConverter {
    pub fn to_base(&self, symbol: &str, quoted: f64) -> f64 {
        match Market::classify(symbol) {
            Market::Domestic => quoted,
            Market::CrossBorder => quoted * self.cross_border_rate,
        }
    }
}
