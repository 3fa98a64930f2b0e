//! CSV bar file adapter.
//!
//! One file holds daily bars for every code, with a header row:
//! `date,code,open,high,low,close,volume`. The file is read once, on first
//! use.

use crate::domain::error::IncrementalError;
use crate::domain::event::Frequency;
use crate::ports::data_port::{BarPort, DataAvailabilityPort};
use chrono::NaiveDate;
use serde::Deserialize;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    code: String,
    #[allow(dead_code)]
    open: f64,
    #[allow(dead_code)]
    high: f64,
    #[allow(dead_code)]
    low: f64,
    close: f64,
    #[allow(dead_code)]
    volume: i64,
}

type CloseIndex = BTreeMap<String, BTreeMap<NaiveDate, f64>>;

pub struct CsvBarAdapter {
    path: PathBuf,
    index_code: String,
    closes: OnceCell<CloseIndex>,
}

impl CsvBarAdapter {
    /// `index_code` is the code whose last bar defines how far data extends.
    pub fn new(path: PathBuf, index_code: &str) -> Self {
        Self {
            path,
            index_code: index_code.to_string(),
            closes: OnceCell::new(),
        }
    }

    fn closes(&self) -> Result<&CloseIndex, IncrementalError> {
        if let Some(index) = self.closes.get() {
            return Ok(index);
        }
        let index = self.read()?;
        Ok(self.closes.get_or_init(|| index))
    }

    fn read(&self) -> Result<CloseIndex, IncrementalError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            IncrementalError::storage(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut index = CloseIndex::new();
        let mut rows = 0usize;
        for result in rdr.deserialize::<BarRow>() {
            let row = result.map_err(|e| IncrementalError::Serialization {
                key: self.path.display().to_string(),
                reason: e.to_string(),
            })?;
            index.entry(row.code).or_default().insert(row.date, row.close);
            rows += 1;
        }
        debug!(path = %self.path.display(), rows, codes = index.len(), "bar file loaded");
        Ok(index)
    }
}

impl DataAvailabilityPort for CsvBarAdapter {
    /// Bars are daily; the same bound serves minute runs, whose bars are
    /// synthesized by the host from the daily close.
    fn latest_available(&self, _frequency: Frequency) -> Result<Option<NaiveDate>, IncrementalError> {
        Ok(self
            .closes()?
            .get(&self.index_code)
            .and_then(|series| series.keys().next_back().copied()))
    }
}

impl BarPort for CsvBarAdapter {
    fn close_price(&self, code: &str, date: NaiveDate) -> Result<Option<f64>, IncrementalError> {
        Ok(self
            .closes()?
            .get(code)
            .and_then(|series| series.get(&date).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bar_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    const BARS: &str = "date,code,open,high,low,close,volume
2024-01-02,AAA,10,11,9,10.5,1000
2024-01-03,AAA,10.5,12,10,11.5,1200
2024-01-02,IDX,100,101,99,100,0
2024-01-03,IDX,100,102,99,101,0
2024-01-04,IDX,101,103,100,102,0
";

    #[test]
    fn latest_available_follows_index_code() {
        let file = bar_file(BARS);
        let idx = CsvBarAdapter::new(file.path().to_path_buf(), "IDX");
        assert_eq!(idx.latest_available(Frequency::Daily).unwrap(), Some(date(4)));
        let aaa = CsvBarAdapter::new(file.path().to_path_buf(), "AAA");
        assert_eq!(aaa.latest_available(Frequency::Minute).unwrap(), Some(date(3)));
    }

    #[test]
    fn unknown_index_code_has_no_data() {
        let file = bar_file(BARS);
        let adapter = CsvBarAdapter::new(file.path().to_path_buf(), "ZZZ");
        assert_eq!(adapter.latest_available(Frequency::Daily).unwrap(), None);
    }

    #[test]
    fn close_price_lookup() {
        let file = bar_file(BARS);
        let adapter = CsvBarAdapter::new(file.path().to_path_buf(), "IDX");
        assert_eq!(adapter.close_price("AAA", date(3)).unwrap(), Some(11.5));
        assert_eq!(adapter.close_price("AAA", date(4)).unwrap(), None);
    }

    #[test]
    fn missing_file_is_storage_error() {
        let adapter = CsvBarAdapter::new(PathBuf::from("/nonexistent/bars.csv"), "IDX");
        assert!(matches!(
            adapter.latest_available(Frequency::Daily),
            Err(IncrementalError::Storage { .. })
        ));
    }

    #[test]
    fn malformed_row_is_serialization_error() {
        let file = bar_file("date,code,open,high,low,close,volume\nyesterday,AAA,1,1,1,1,1\n");
        let adapter = CsvBarAdapter::new(file.path().to_path_buf(), "AAA");
        assert!(matches!(
            adapter.close_price("AAA", date(2)),
            Err(IncrementalError::Serialization { .. })
        ));
    }
}
