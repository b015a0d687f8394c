//! Data access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::AlphaMintError;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` whose trading day falls in `[start_date, end_date]`, oldest first.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphaMintError>;

    fn list_symbols(&self) -> Result<Vec<String>, AlphaMintError>;

    /// First day, last day and bar count for `symbol`, or `None` if there is no data.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlphaMintError>;
}
