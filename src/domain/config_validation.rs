//! Configuration validation and assembly of [`SimulationConfig`].
//!
//! Every value is checked before a backtest runs. Keys that are absent fall back to the
//! defaults of [`SimulationConfig`], except the ones a run cannot do without.

use crate::domain::config::{
    CrossBorderFees, DomesticFees, PortfolioConfig, RiskParams, SimulationConfig, SizingParams,
};
use crate::domain::error::AlphaMintError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_simulation_config(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    validate_backtest_config(config)?;
    validate_portfolio_config(config)?;
    validate_risk_config(config)?;
    validate_fee_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    let capital = config.get_double("backtest", "initial_capital", 0.0);
    if capital <= 0.0 || !capital.is_finite() {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }
    let rf = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&rf) {
        return Err(invalid("backtest", "risk_free_rate", "risk_free_rate must be between 0 and 1"));
    }
    validate_dates(config)?;
    validate_codes(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    for key in ["buy_fraction", "sell_fraction", "max_single_position"] {
        let value = config.get_double("portfolio", key, 0.2);
        if value <= 0.0 || value > 1.0 {
            return Err(invalid("portfolio", key, &format!("{key} must be in (0, 1]")));
        }
    }
    Ok(())
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    let defaults = RiskParams::default();
    for (key, default) in [
        ("stop_loss", defaults.stop_loss),
        ("trailing_stop", defaults.trailing_stop),
    ] {
        let value = config.get_double("risk", key, default);
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid("risk", key, &format!("{key} must be between 0 and 1")));
        }
    }
    if config.get_double("risk", "take_profit", defaults.take_profit) < 0.0 {
        return Err(invalid("risk", "take_profit", "take_profit must be non-negative"));
    }
    Ok(())
}

pub fn validate_fee_config(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    for key in [
        "commission_rate",
        "min_commission",
        "stamp_duty_rate",
        "transfer_fee_rate",
    ] {
        non_negative(config, "domestic", key)?;
    }
    if config.get_int("domestic", "lot_size", 100) < 1 {
        return Err(invalid("domestic", "lot_size", "lot_size must be at least 1"));
    }

    for key in [
        "fx_slippage",
        "commission_rate",
        "min_commission",
        "stamp_duty_rate",
        "stamp_rounding_unit",
        "regulatory_fee_rate",
    ] {
        non_negative(config, "cross_border", key)?;
    }
    let rate = config.get_double("cross_border", "exchange_rate", 1.0);
    if rate <= 0.0 || !rate.is_finite() {
        return Err(invalid("cross_border", "exchange_rate", "exchange_rate must be positive"));
    }
    Ok(())
}

/// Validates `config` and builds the immutable parameter set for a run.
pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, AlphaMintError> {
    validate_simulation_config(config)?;

    let d = DomesticFees::default();
    let domestic = DomesticFees {
        commission_rate: config.get_double("domestic", "commission_rate", d.commission_rate),
        min_commission: config.get_double("domestic", "min_commission", d.min_commission),
        stamp_duty_rate: config.get_double("domestic", "stamp_duty_rate", d.stamp_duty_rate),
        transfer_fee_rate: config.get_double("domestic", "transfer_fee_rate", d.transfer_fee_rate),
        lot_size: config.get_int("domestic", "lot_size", d.lot_size),
    };

    let c = CrossBorderFees::default();
    let cross_border = CrossBorderFees {
        exchange_rate: config.get_double("cross_border", "exchange_rate", c.exchange_rate),
        fx_slippage: config.get_double("cross_border", "fx_slippage", c.fx_slippage),
        commission_rate: config.get_double("cross_border", "commission_rate", c.commission_rate),
        min_commission: config.get_double("cross_border", "min_commission", c.min_commission),
        stamp_duty_rate: config.get_double("cross_border", "stamp_duty_rate", c.stamp_duty_rate),
        stamp_rounding_unit: config.get_double(
            "cross_border",
            "stamp_rounding_unit",
            c.stamp_rounding_unit,
        ),
        regulatory_fee_rate: config.get_double(
            "cross_border",
            "regulatory_fee_rate",
            c.regulatory_fee_rate,
        ),
    };

    let s = SizingParams::default();
    let r = RiskParams::default();
    let portfolio = PortfolioConfig {
        initial_cash: config.get_double("backtest", "initial_capital", 0.0),
        allow_short: config.get_bool("portfolio", "allow_short", false),
        lot_size: domestic.lot_size,
        sizing: SizingParams {
            buy_fraction: config.get_double("portfolio", "buy_fraction", s.buy_fraction),
            sell_fraction: config.get_double("portfolio", "sell_fraction", s.sell_fraction),
            max_single_position: config.get_double(
                "portfolio",
                "max_single_position",
                s.max_single_position,
            ),
        },
        risk: RiskParams {
            stop_loss: config.get_double("risk", "stop_loss", r.stop_loss),
            trailing_stop: config.get_double("risk", "trailing_stop", r.trailing_stop),
            take_profit: config.get_double("risk", "take_profit", r.take_profit),
        },
    };

    Ok(SimulationConfig {
        portfolio,
        domestic,
        cross_border,
    })
}

/// Comma-separated `[backtest] codes`, trimmed and de-duplicated in order.
pub fn parse_codes(raw: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in raw.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if !codes.iter().any(|c| c == code) {
            codes.push(code.to_string());
        }
    }
    codes
}

pub fn backtest_dates(config: &dyn ConfigPort) -> Result<(NaiveDate, NaiveDate), AlphaMintError> {
    let start = parse_date(config.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string("backtest", "end_date").as_deref(), "end_date")?;
    Ok((start, end))
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    let (start_date, end_date) = backtest_dates(config)?;
    if start_date >= end_date {
        return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
    }
    Ok(())
}

fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, AlphaMintError> {
    match value {
        None => Err(AlphaMintError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                &format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), AlphaMintError> {
    match config.get_string("backtest", "codes") {
        Some(raw) if !parse_codes(&raw).is_empty() => Ok(()),
        _ => Err(AlphaMintError::ConfigMissing {
            section: "backtest".to_string(),
            key: "codes".to_string(),
        }),
    }
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), AlphaMintError> {
    let value = config.get_double(section, key, 0.0);
    if value < 0.0 || !value.is_finite() {
        return Err(invalid(section, key, &format!("{key} must be non-negative")));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> AlphaMintError {
    AlphaMintError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
