//! Base-level index builder.
//!
//! Pure transform from a price series to an index series: the first
//! close becomes the normalization anchor, every level is
//! `base * close / anchor`, and the divisor `anchor / base` recovers
//! prices (`price = level * divisor`). Row 0 is exactly the base.
//!
//! The output CSV has the columns `date,index_level,divisor,notes`;
//! divisor and notes repeat on every row so the file stands alone.

use crate::domain::PriceSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Conventional base level for new indexes.
pub const DEFAULT_BASE: f64 = 1000.0;

/// One index row.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub date: NaiveDate,
    pub index_level: f64,
}

/// A base-normalized index series.
#[derive(Debug, Clone)]
pub struct IndexSeries {
    pub coin: String,
    /// Level assigned to the first observation.
    pub base: f64,
    /// First close divided by the base; `level * divisor` recovers price.
    pub divisor: f64,
    pub notes: String,
    pub rows: Vec<IndexRow>,
}

/// Structured errors for index building and CSV round-trips.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build index from empty series for '{coin}'")]
    EmptySeries { coin: String },

    #[error("base level must be positive and finite, got {base}")]
    BadBase { base: f64 },

    #[error("first close must be positive and finite, got {close} on {date}")]
    BadAnchor { date: NaiveDate, close: f64 },

    #[error("index csv error: {0}")]
    Csv(String),

    #[error("index i/o error: {0}")]
    Io(String),

    #[error("index file {path} has no rows")]
    EmptyFile { path: PathBuf },
}

/// Build a base-normalized index from a price series.
///
/// Rows are sorted by date before the anchor is taken, so the transform
/// is deterministic regardless of input order.
pub fn build_index(series: &PriceSeries, base: f64) -> Result<IndexSeries, IndexError> {
    if !base.is_finite() || base <= 0.0 {
        return Err(IndexError::BadBase { base });
    }

    let mut observations = series.observations.clone();
    observations.sort_by_key(|o| o.date);

    let first = observations.first().ok_or_else(|| IndexError::EmptySeries {
        coin: series.coin.clone(),
    })?;
    let anchor = first.close;
    if !anchor.is_finite() || anchor <= 0.0 {
        return Err(IndexError::BadAnchor {
            date: first.date,
            close: anchor,
        });
    }

    let rows = observations
        .iter()
        .map(|o| IndexRow {
            date: o.date,
            index_level: base * (o.close / anchor),
        })
        .collect();

    Ok(IndexSeries {
        coin: series.coin.clone(),
        base,
        divisor: anchor / base,
        notes: format!("daily close index (base={base}); source={}", series.source),
        rows,
    })
}

/// On-disk row shape. Divisor and notes are constant across a file.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    index_level: f64,
    divisor: f64,
    notes: String,
}

impl IndexSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index levels in row order.
    pub fn levels(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.index_level).collect()
    }

    /// First and last dates, if any rows exist.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    /// Write the series as CSV (`date,index_level,divisor,notes`).
    pub fn write_csv(&self, path: &Path) -> Result<(), IndexError> {
        let mut wtr =
            csv::Writer::from_path(path).map_err(|e| IndexError::Csv(e.to_string()))?;
        for row in &self.rows {
            wtr.serialize(CsvRow {
                date: row.date,
                index_level: row.index_level,
                divisor: self.divisor,
                notes: self.notes.clone(),
            })
            .map_err(|e| IndexError::Csv(e.to_string()))?;
        }
        wtr.flush().map_err(|e| IndexError::Io(e.to_string()))?;
        Ok(())
    }

    /// Read a series back from CSV.
    ///
    /// The base is recovered from row 0 (which equals the base by
    /// construction) and the coin from the leading token of the file
    /// stem — our files are named `{coin}_{quote}_base{base}.csv`.
    pub fn read_csv(path: &Path) -> Result<Self, IndexError> {
        let mut rdr =
            csv::Reader::from_path(path).map_err(|e| IndexError::Csv(e.to_string()))?;

        let mut rows = Vec::new();
        let mut divisor = None;
        let mut notes = String::new();
        for result in rdr.deserialize() {
            let record: CsvRow = result.map_err(|e| IndexError::Csv(e.to_string()))?;
            if divisor.is_none() {
                divisor = Some(record.divisor);
                notes = record.notes;
            }
            rows.push(IndexRow {
                date: record.date,
                index_level: record.index_level,
            });
        }

        let Some(divisor) = divisor else {
            return Err(IndexError::EmptyFile {
                path: path.to_path_buf(),
            });
        };

        Ok(IndexSeries {
            coin: coin_from_path(path),
            base: rows[0].index_level,
            divisor,
            notes,
            rows,
        })
    }
}

fn coin_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("index");
    stem.split('_').next().unwrap_or(stem).to_string()
}
