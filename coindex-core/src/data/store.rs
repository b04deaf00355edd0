//! Parquet price store.
//!
//! Layout: `{root}/{provider}/{coin}_{quote}_daily.parquet`, one file per
//! (provider, coin, quote), next to a `{…}_daily.meta.json` sidecar with
//! the source tag, row count, date range and a blake3 content hash.
//!
//! Writes are atomic (write to .tmp, rename into place) and validated:
//! a series that fails its own invariants is never persisted. Loads
//! validate schema and the date/timestamp consistency of every row.

use crate::domain::{PriceObservation, PriceSeries, ProviderKind, SeriesError};
use chrono::{DateTime, NaiveDate, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata sidecar for one stored series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub coin: String,
    pub quote: String,
    pub source: ProviderKind,
    pub row_count: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

/// Structured errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("empty series for '{coin}': nothing to store")]
    EmptySeries { coin: String },

    #[error("no stored prices for '{coin}/{quote}' — run `pull --coin {coin}` first")]
    NotFound { coin: String, quote: String },
}

impl From<SeriesError> for StoreError {
    fn from(e: SeriesError) -> Self {
        StoreError::Validation(e.to_string())
    }
}

/// The price store rooted at one output directory.
pub struct PriceStore {
    root: PathBuf,
}

impl PriceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the Parquet file for one (provider, coin, quote).
    pub fn series_path(&self, source: ProviderKind, coin: &str, quote: &str) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(format!("{coin}_{quote}_daily.parquet"))
    }

    fn meta_path(&self, source: ProviderKind, coin: &str, quote: &str) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(format!("{coin}_{quote}_daily.meta.json"))
    }

    /// Persist a series under its source provider's directory.
    ///
    /// The series must be canonical (validated here); writes are atomic.
    /// Returns the path of the Parquet file.
    pub fn write(&self, series: &PriceSeries) -> Result<PathBuf, StoreError> {
        if series.is_empty() {
            return Err(StoreError::EmptySeries {
                coin: series.coin.clone(),
            });
        }
        series.validate()?;

        let path = self.series_path(series.source, &series.coin, &series.quote);
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Io("series path has no parent".into()))?;
        fs::create_dir_all(dir)
            .map_err(|e| StoreError::Io(format!("failed to create dir: {e}")))?;

        let df = series_to_dataframe(&series.observations)?;
        let tmp_path = path.with_extension("parquet.tmp");
        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(format!("atomic rename failed: {e}"))
        })?;

        let meta = StoreMeta {
            coin: series.coin.clone(),
            quote: series.quote.clone(),
            source: series.source,
            row_count: series.len(),
            start_date: series.observations[0].date,
            end_date: series.observations[series.len() - 1].date,
            data_hash: blake3::hash(
                &serde_json::to_vec(&series.observations)
                    .map_err(|e| StoreError::Io(format!("hash serialization: {e}")))?,
            )
            .to_hex()
            .to_string(),
            written_at: Utc::now(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Io(format!("meta serialization: {e}")))?;
        fs::write(self.meta_path(series.source, &series.coin, &series.quote), meta_json)
            .map_err(|e| StoreError::Io(format!("meta write: {e}")))?;

        Ok(path)
    }

    /// Load one stored series from a specific provider's directory.
    pub fn load(
        &self,
        source: ProviderKind,
        coin: &str,
        quote: &str,
    ) -> Result<PriceSeries, StoreError> {
        let path = self.series_path(source, coin, quote);
        if !path.exists() {
            return Err(StoreError::NotFound {
                coin: coin.to_string(),
                quote: quote.to_string(),
            });
        }

        let observations = load_and_validate_parquet(&path)?;
        let mut series = PriceSeries::new(coin, quote, source);
        series.observations = observations;
        series.validate()?;
        Ok(series)
    }

    /// Metadata sidecar for one stored series, if present and readable.
    pub fn meta(&self, source: ProviderKind, coin: &str, quote: &str) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(source, coin, quote)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Find the stored series for a coin, walking the provider preference
    /// order. Returns the first provider with a price file on disk.
    pub fn resolve(&self, coin: &str, quote: &str) -> Option<(ProviderKind, PathBuf)> {
        ProviderKind::DEFAULT_ORDER.into_iter().find_map(|source| {
            let path = self.series_path(source, coin, quote);
            path.exists().then_some((source, path))
        })
    }

    /// Load the preferred stored series for a coin (see [`Self::resolve`]).
    pub fn load_preferred(&self, coin: &str, quote: &str) -> Result<PriceSeries, StoreError> {
        let (source, _) = self.resolve(coin, quote).ok_or_else(|| StoreError::NotFound {
            coin: coin.to_string(),
            quote: quote.to_string(),
        })?;
        self.load(source, coin, quote)
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const EXPECTED_COLUMNS: [&str; 5] = ["timestamp_utc", "date", "close", "volume", "market_cap"];

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Convert observations to a DataFrame. Timestamps are epoch
/// milliseconds; the date column is a proper Date; volume and market cap
/// stay nullable.
fn series_to_dataframe(observations: &[PriceObservation]) -> Result<DataFrame, StoreError> {
    let epoch = epoch_date();
    let timestamps: Vec<i64> = observations
        .iter()
        .map(|o| o.timestamp_utc.timestamp_millis())
        .collect();
    let dates: Vec<i32> = observations
        .iter()
        .map(|o| (o.date - epoch).num_days() as i32)
        .collect();
    let closes: Vec<f64> = observations.iter().map(|o| o.close).collect();
    let volumes: Vec<Option<f64>> = observations.iter().map(|o| o.volume).collect();
    let caps: Vec<Option<f64>> = observations.iter().map(|o| o.market_cap).collect();

    DataFrame::new(vec![
        Column::new("timestamp_utc".into(), timestamps),
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))?,
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("market_cap".into(), caps),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<(), StoreError> {
    let file =
        fs::File::create(path).map_err(|e| StoreError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

/// Load a Parquet file, checking schema and per-row consistency.
fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceObservation>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Validation("empty parquet file".into()));
    }
    for col_name in &EXPECTED_COLUMNS {
        if df.column(col_name).is_err() {
            return Err(StoreError::Validation(format!(
                "missing column '{col_name}'"
            )));
        }
    }

    dataframe_to_series(&df)
}

fn dataframe_to_series(df: &DataFrame) -> Result<Vec<PriceObservation>, StoreError> {
    let map_err = |e: PolarsError| StoreError::Parquet(format!("column read: {e}"));

    let ts_ca = df
        .column("timestamp_utc")
        .map_err(map_err)?
        .i64()
        .map_err(|e| StoreError::Parquet(format!("timestamp column type: {e}")))?;
    let date_ca = df
        .column("date")
        .map_err(map_err)?
        .date()
        .map_err(|e| StoreError::Parquet(format!("date column type: {e}")))?;
    let close_ca = df
        .column("close")
        .map_err(map_err)?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("close column type: {e}")))?;
    let vol_ca = df
        .column("volume")
        .map_err(map_err)?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("volume column type: {e}")))?;
    let cap_ca = df
        .column("market_cap")
        .map_err(map_err)?
        .f64()
        .map_err(|e| StoreError::Parquet(format!("market_cap column type: {e}")))?;

    let epoch = epoch_date();
    let n = df.height();
    let mut observations = Vec::with_capacity(n);

    for i in 0..n {
        let ms = ts_ca
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null timestamp at row {i}")))?;
        let close = close_ca
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null close at row {i}")))?;
        let mut obs = PriceObservation::from_epoch_ms(ms, close)
            .ok_or_else(|| StoreError::Validation(format!("bad timestamp {ms} at row {i}")))?;

        // The stored date column must agree with the timestamp.
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null date at row {i}")))?;
        let stored_date = epoch + chrono::Duration::days(date_days as i64);
        if stored_date != obs.date {
            return Err(StoreError::Validation(format!(
                "date {stored_date} disagrees with timestamp at row {i}"
            )));
        }

        obs.volume = vol_ca.get(i);
        obs.market_cap = cap_ca.get(i);
        observations.push(obs);
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_store_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("coindex_store_test_{}_{id}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_series(source: ProviderKind) -> PriceSeries {
        let mut series = PriceSeries::new("bitcoin", "usd", source);
        let mut first = PriceObservation::from_epoch_ms(1_704_067_200_000, 42000.0).unwrap();
        first.volume = Some(2.0e10);
        first.market_cap = Some(8.0e11);
        let second = PriceObservation::from_epoch_ms(1_704_153_600_000, 42500.0).unwrap();
        series.observations = vec![first, second];
        series
    }

    #[test]
    fn write_and_load_roundtrip() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);
        let series = sample_series(ProviderKind::Coingecko);

        let path = store.write(&series).unwrap();
        assert!(path.ends_with("coingecko/bitcoin_usd_daily.parquet"));

        let loaded = store.load(ProviderKind::Coingecko, "bitcoin", "usd").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.source, ProviderKind::Coingecko);
        assert_eq!(loaded.observations[0].close, 42000.0);
        assert_eq!(loaded.observations[0].volume, Some(2.0e10));
        assert_eq!(loaded.observations[0].market_cap, Some(8.0e11));
        // Nullable columns stay null.
        assert_eq!(loaded.observations[1].volume, None);
        assert_eq!(loaded.observations[1].market_cap, None);
        assert_eq!(
            loaded.observations[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn sidecar_records_range_and_hash() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);
        let series = sample_series(ProviderKind::Yahoo);

        store.write(&series).unwrap();
        let meta = store.meta(ProviderKind::Yahoo, "bitcoin", "usd").unwrap();

        assert_eq!(meta.coin, "bitcoin");
        assert_eq!(meta.source, ProviderKind::Yahoo);
        assert_eq!(meta.row_count, 2);
        assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(meta.data_hash.len(), 64);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_series_is_rejected() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);
        let series = PriceSeries::new("bitcoin", "usd", ProviderKind::Coingecko);

        assert!(matches!(
            store.write(&series),
            Err(StoreError::EmptySeries { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_series_is_never_persisted() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);
        let mut series = sample_series(ProviderKind::Coingecko);
        series.observations.reverse(); // out of order now

        assert!(matches!(
            store.write(&series),
            Err(StoreError::Validation(_))
        ));
        assert!(store.resolve("bitcoin", "usd").is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);

        let err = store
            .load(ProviderKind::Coingecko, "bitcoin", "usd")
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(err.to_string().contains("pull"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn resolve_walks_preference_order() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);

        store.write(&sample_series(ProviderKind::Exchange)).unwrap();
        store.write(&sample_series(ProviderKind::Yahoo)).unwrap();

        let (source, _) = store.resolve("bitcoin", "usd").unwrap();
        assert_eq!(source, ProviderKind::Yahoo);

        store.write(&sample_series(ProviderKind::Coingecko)).unwrap();
        let (source, _) = store.resolve("bitcoin", "usd").unwrap();
        assert_eq!(source, ProviderKind::Coingecko);

        let loaded = store.load_preferred("bitcoin", "usd").unwrap();
        assert_eq!(loaded.source, ProviderKind::Coingecko);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn writes_leave_no_temp_files() {
        let dir = temp_store_dir();
        let store = PriceStore::new(&dir);
        store.write(&sample_series(ProviderKind::Coingecko)).unwrap();

        let provider_dir = dir.join("coingecko");
        let leftover: Vec<_> = fs::read_dir(&provider_dir)
            .unwrap()
            .flatten()
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftover.is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}
