//! CSV price history adapter.
//!
//! One `<asset_id>.csv` per asset with a header row and columns
//! `date,open,high,low,close`. An optional `assets.csv` with columns
//! `id,name` supplies display names.

use crate::domain::error::RsTraderError;
use crate::domain::price::PricePoint;
use crate::ports::price_port::PriceHistoryPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

const CATALOG_FILE: &str = "assets.csv";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, asset_id: &str) -> PathBuf {
        self.base_path.join(format!("{asset_id}.csv"))
    }
}

fn query_error(reason: String) -> RsTraderError {
    RsTraderError::DatabaseQuery { reason }
}

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str, RsTraderError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| query_error(format!("missing {name} column")))
}

fn price(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, RsTraderError> {
    field(record, index, name)?
        .parse()
        .map_err(|e| query_error(format!("invalid {name} value: {e}")))
}

impl PriceHistoryPort for CsvAdapter {
    fn get_price_history(&self, asset_id: &str) -> Result<Vec<PricePoint>, RsTraderError> {
        let path = self.csv_path(asset_id);
        if !path.exists() {
            return Err(RsTraderError::NoData {
                asset: asset_id.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| RsTraderError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| query_error(format!("CSV parse error in {}: {}", path.display(), e)))?;
            let date_str = field(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| query_error(format!("invalid date '{date_str}': {e}")))?;

            bars.push(PricePoint {
                asset_id: asset_id.to_string(),
                date,
                open: price(&record, 1, "open")?,
                high: price(&record, 2, "high")?,
                low: price(&record, 3, "low")?,
                close: price(&record, 4, "close")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn get_asset_universe(&self) -> Result<Vec<String>, RsTraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| RsTraderError::Database {
            reason: format!("failed to read directory {}: {}", self.base_path.display(), e),
        })?;

        let mut assets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RsTraderError::Database {
                reason: format!("directory entry error: {e}"),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == CATALOG_FILE {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".csv") {
                assets.push(stem.to_string());
            }
        }

        assets.sort();
        Ok(assets)
    }

    fn asset_name(&self, asset_id: &str) -> Result<Option<String>, RsTraderError> {
        let path = self.base_path.join(CATALOG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| RsTraderError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        for result in rdr.records() {
            let record = result.map_err(|e| query_error(format!("CSV parse error: {e}")))?;
            if record.get(0).map(str::trim) == Some(asset_id) {
                return Ok(record.get(1).map(|n| n.trim().to_string()));
            }
        }
        Ok(None)
    }
}
