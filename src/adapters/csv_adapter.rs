//! CSV file data adapter: bar files per symbol and scripted signal files.

use crate::domain::bar::Bar;
use crate::domain::error::AlphaMintError;
use crate::domain::event::SignalKind;
use crate::domain::strategy::ScriptedSignal;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// `<dir>/<symbol>.csv`, else `<dir>/daily/<symbol>.csv`.
    fn csv_path(&self, symbol: &str) -> Option<PathBuf> {
        let file = format!("{symbol}.csv");
        [self.base_path.join(&file), self.base_path.join("daily").join(&file)]
            .into_iter()
            .find(|p| p.is_file())
    }

    fn read_all(&self, symbol: &str) -> Result<Vec<Bar>, AlphaMintError> {
        let path = self.csv_path(symbol).ok_or_else(|| AlphaMintError::NoData {
            symbol: symbol.to_string(),
        })?;
        let mut rdr = csv::Reader::from_path(&path)?;
        let mut bars = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result?;
            bars.push(parse_bar(symbol, &record).map_err(|reason| AlphaMintError::Data {
                reason: format!("{} row {}: {}", path.display(), line + 2, reason),
            })?);
        }
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, AlphaMintError> {
        let mut bars = self.read_all(symbol)?;
        bars.retain(|b| {
            let day = b.trading_day();
            day >= start_date && day <= end_date
        });
        let before = bars.len();
        bars.retain(Bar::has_tradable_close);
        if bars.len() < before {
            tracing::warn!(symbol, skipped = before - bars.len(), "bars without a tradable close skipped");
        }
        tracing::debug!(symbol, bars = bars.len(), "loaded bars");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, AlphaMintError> {
        let mut symbols = BTreeSet::new();
        for dir in [self.base_path.clone(), self.base_path.join("daily")] {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if !path.extension().is_some_and(|ext| ext == "csv") {
                    continue;
                }
                if let Some(stem) = path.file_stem() {
                    symbols.insert(stem.to_string_lossy().into_owned());
                }
            }
        }
        Ok(symbols.into_iter().collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlphaMintError> {
        let bars = match self.read_all(symbol) {
            Ok(bars) => bars,
            Err(AlphaMintError::NoData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((
                first.trading_day(),
                last.trading_day(),
                bars.len(),
            ))),
            _ => Ok(None),
        }
    }
}

/// Reads `date,symbol,signal[,strength]` rows. Strength defaults to 1.0.
pub fn read_signals(path: &Path) -> Result<Vec<ScriptedSignal>, AlphaMintError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut signals = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let signal = parse_signal(&record).map_err(|reason| AlphaMintError::Data {
            reason: format!("{} row {}: {}", path.display(), line + 2, reason),
        })?;
        signals.push(signal);
    }
    tracing::debug!(path = %path.display(), signals = signals.len(), "loaded signals");
    Ok(signals)
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|e| format!("invalid date {raw:?}: {e}"))
}

fn field<'a>(record: &'a StringRecord, index: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(index)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing {name} column"))
}

fn number<T: std::str::FromStr>(record: &StringRecord, index: usize, name: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    field(record, index, name)?
        .parse()
        .map_err(|e| format!("invalid {name} value: {e}"))
}

fn parse_bar(symbol: &str, record: &StringRecord) -> Result<Bar, String> {
    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp: parse_timestamp(field(record, 0, "date")?)?,
        open: number(record, 1, "open")?,
        high: number(record, 2, "high")?,
        low: number(record, 3, "low")?,
        close: number(record, 4, "close")?,
        // Some vendors export volume as a float.
        volume: number::<f64>(record, 5, "volume")? as i64,
    })
}

fn parse_signal(record: &StringRecord) -> Result<ScriptedSignal, String> {
    let date = parse_timestamp(field(record, 0, "date")?)?.date();
    let symbol = field(record, 1, "symbol")?.to_string();
    let raw_kind = field(record, 2, "signal")?;
    let kind = SignalKind::parse(raw_kind).ok_or_else(|| format!("unknown signal {raw_kind:?}"))?;
    let strength = match record.get(3).map(str::trim) {
        Some(s) if !s.is_empty() => s
            .parse()
            .map_err(|e| format!("invalid strength value: {e}"))?,
        _ => 1.0,
    };
    Ok(ScriptedSignal {
        date,
        symbol,
        kind,
        strength,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "date,open,high,low,close,volume\n";

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = format!(
            "{HEADER}2024-01-17,11.0,12.0,10.5,11.5,55000\n\
             2024-01-15,10.0,11.0,9.0,10.5,50000\n\
             2024-01-16,10.5,11.5,10.0,11.0,60000\n"
        );
        fs::write(path.join("600036.csv"), csv_content).unwrap();
        fs::create_dir(path.join("daily")).unwrap();
        fs::write(
            path.join("daily").join("00700.csv"),
            format!("{HEADER}2024-01-15 16:00:00,300.0,305.0,298.0,302.0,1000000.0\n"),
        )
        .unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn fetch_bars_sorts_and_parses() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("600036", date(1), date(31)).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].trading_day(), date(15));
        assert_eq!(bars[0].symbol, "600036");
        assert_eq!(bars[0].open, 10.0);
        assert_eq!(bars[0].close, 10.5);
        assert_eq!(bars[0].volume, 50000);
        assert_eq!(bars[2].trading_day(), date(17));
    }

    #[test]
    fn fetch_bars_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_bars("600036", date(16), date(16)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 11.0);
    }

    #[test]
    fn fetch_bars_skips_untradable_closes() {
        let (_dir, path) = setup_test_data();
        fs::write(
            path.join("000001.csv"),
            format!(
                "{HEADER}2024-01-15,10.0,10.0,10.0,10.0,100\n\
                 2024-01-16,0,0,0,0,0\n\
                 2024-01-17,10.2,10.2,10.2,-1.0,100\n\
                 2024-01-18,10.4,10.4,10.4,10.4,100\n"
            ),
        )
        .unwrap();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_bars("000001", date(1), date(31)).unwrap();
        let days: Vec<NaiveDate> = bars.iter().map(Bar::trading_day).collect();
        assert_eq!(days, vec![date(15), date(18)]);
    }

    #[test]
    fn falls_back_to_daily_directory_and_datetime_format() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_bars("00700", date(1), date(31)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(
            bars[0].timestamp,
            date(15).and_hms_opt(16, 0, 0).unwrap()
        );
        assert_eq!(bars[0].volume, 1_000_000);
    }

    #[test]
    fn missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_bars("000001", date(1), date(31)).unwrap_err();
        assert!(matches!(err, AlphaMintError::NoData { ref symbol } if symbol == "000001"));
        assert_eq!(adapter.get_data_range("000001").unwrap(), None);
    }

    #[test]
    fn bad_row_reports_file_and_row() {
        let (_dir, path) = setup_test_data();
        fs::write(path.join("000001.csv"), format!("{HEADER}2024-01-15,abc,1,1,1,1\n")).unwrap();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_bars("000001", date(1), date(31)).unwrap_err();
        match err {
            AlphaMintError::Data { reason } => {
                assert!(reason.contains("row 2"), "{reason}");
                assert!(reason.contains("open"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn list_symbols_covers_both_directories() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["00700", "600036"]);
    }

    #[test]
    fn data_range_reports_first_last_and_count() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.get_data_range("600036").unwrap(),
            Some((date(15), date(17), 3))
        );
    }

    #[test]
    fn read_signals_parses_kind_and_optional_strength() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signals.csv");
        fs::write(
            &path,
            "date,symbol,signal,strength\n\
             2024-01-15,600036,LONG,0.5\n\
             2024-01-16,00700,short,\n\
             2024-01-17,600036,EXIT\n",
        )
        .unwrap();

        let signals = read_signals(&path).unwrap();
        assert_eq!(signals.len(), 3);
        assert_eq!(signals[0].kind, SignalKind::Long);
        assert_eq!(signals[0].strength, 0.5);
        assert_eq!(signals[1].kind, SignalKind::Short);
        assert_eq!(signals[1].strength, 1.0);
        assert_eq!(signals[2].kind, SignalKind::Exit);
        assert_eq!(signals[2].date, date(17));
    }

    #[test]
    fn read_signals_rejects_unknown_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signals.csv");
        fs::write(&path, "date,symbol,signal\n2024-01-15,600036,HOLD\n").unwrap();
        let err = read_signals(&path).unwrap_err();
        assert!(matches!(err, AlphaMintError::Data { ref reason } if reason.contains("HOLD")));
    }
}
