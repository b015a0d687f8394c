//! CSV report adapter: writes `equity_history.csv` and `trade_log.csv`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AlphaMintError;
use crate::ports::report_port::ReportPort;
use std::fs;
use std::path::Path;

pub const EQUITY_FILE: &str = "equity_history.csv";
pub const TRADE_FILE: &str = "trade_log.csv";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_equity(result: &BacktestResult, path: &Path) -> Result<(), AlphaMintError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["timestamp", "cash", "market_value", "total_equity"])?;
        for snap in &result.equity_history {
            wtr.write_record([
                snap.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                format!("{:.2}", snap.cash),
                format!("{:.2}", snap.market_value),
                format!("{:.2}", snap.total_equity),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), AlphaMintError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record([
            "timestamp",
            "order_id",
            "symbol",
            "direction",
            "quantity",
            "price",
            "cost",
            "realized_pnl",
            "pnl_pct",
            "cash_before",
            "cash_after",
            "exit_rule",
        ])?;
        for trade in &result.trades {
            wtr.write_record([
                trade.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                trade.order_id.to_string(),
                trade.symbol.clone(),
                trade.direction.to_string(),
                trade.quantity.to_string(),
                format!("{:.4}", trade.price),
                format!("{:.2}", trade.cost),
                trade
                    .realized_pnl
                    .map(|p| format!("{p:.2}"))
                    .unwrap_or_default(),
                trade
                    .price_return
                    .map(|f| format!("{:.2}", f * 100.0))
                    .unwrap_or_default(),
                format!("{:.2}", trade.cash_before),
                format!("{:.2}", trade.cash_after),
                trade
                    .exit_rule
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_default(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), AlphaMintError> {
        fs::create_dir_all(output_dir).map_err(|e| AlphaMintError::Report {
            reason: format!("cannot create {}: {}", output_dir.display(), e),
        })?;
        Self::write_equity(result, &output_dir.join(EQUITY_FILE))?;
        Self::write_trades(result, &output_dir.join(TRADE_FILE))?;
        tracing::info!(
            dir = %output_dir.display(),
            snapshots = result.equity_history.len(),
            trades = result.trades.len(),
            "report written"
        );
        Ok(())
    }
}
