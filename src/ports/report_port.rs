//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AlphaMintError;
use std::path::Path;

/// Port for writing backtest results.
pub trait ReportPort {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), AlphaMintError>;
}
