//! Price observations and series.
//!
//! A `PriceObservation` is one daily close for one asset; a `PriceSeries`
//! is the ordered set of observations returned by a single provider fetch.
//! Series are canonicalized (sorted, deduplicated by calendar date) before
//! anything downstream touches them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which upstream data source produced a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Coingecko,
    Yahoo,
    Exchange,
}

impl ProviderKind {
    /// Fallback preference order: tried first to last.
    pub const DEFAULT_ORDER: [ProviderKind; 3] = [
        ProviderKind::Coingecko,
        ProviderKind::Yahoo,
        ProviderKind::Exchange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Coingecko => "coingecko",
            ProviderKind::Yahoo => "yahoo",
            ProviderKind::Exchange => "exchange",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "coingecko" => Some(ProviderKind::Coingecko),
            "yahoo" => Some(ProviderKind::Yahoo),
            "exchange" => Some(ProviderKind::Exchange),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One daily close (before canonicalization).
///
/// `date` is always the UTC calendar date of `timestamp_utc`. Volume and
/// market cap are optional: exchanges report volume but not cap, CoinGecko
/// reports both, and either can be missing for individual rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub timestamp_utc: DateTime<Utc>,
    pub date: NaiveDate,
    pub close: f64,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
}

impl PriceObservation {
    pub fn new(timestamp_utc: DateTime<Utc>, close: f64) -> Self {
        Self {
            timestamp_utc,
            date: timestamp_utc.date_naive(),
            close,
            volume: None,
            market_cap: None,
        }
    }

    /// Build an observation from a millisecond epoch timestamp.
    ///
    /// Returns `None` for timestamps outside the representable range.
    pub fn from_epoch_ms(epoch_ms: i64, close: f64) -> Option<Self> {
        DateTime::from_timestamp_millis(epoch_ms).map(|ts| Self::new(ts, close))
    }

    /// Build an observation from a second epoch timestamp.
    pub fn from_epoch_secs(epoch_secs: i64, close: f64) -> Option<Self> {
        DateTime::from_timestamp(epoch_secs, 0).map(|ts| Self::new(ts, close))
    }
}

/// Structured errors for series validation.
#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("duplicate date {date} in series")]
    DuplicateDate { date: NaiveDate },

    #[error("observations out of order at {date}")]
    OutOfOrder { date: NaiveDate },

    #[error("non-finite close at {date}")]
    BadClose { date: NaiveDate },

    #[error("date {date} does not match its timestamp")]
    DateMismatch { date: NaiveDate },
}

/// What `canonicalize` changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub duplicates_removed: usize,
    pub reordered: bool,
}

/// Daily price history for one asset from one data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    /// Asset identifier (e.g. "bitcoin").
    pub coin: String,
    /// Quote currency (e.g. "usd").
    pub quote: String,
    pub source: ProviderKind,
    pub observations: Vec<PriceObservation>,
}

impl PriceSeries {
    pub fn new(coin: impl Into<String>, quote: impl Into<String>, source: ProviderKind) -> Self {
        Self {
            coin: coin.into(),
            quote: quote.into(),
            source,
            observations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// First and last calendar dates, if the series is non-empty.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.observations.first(), self.observations.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.close).collect()
    }

    /// Sort by timestamp and drop repeated calendar dates, keeping the
    /// earliest observation for each date.
    pub fn canonicalize(&mut self) -> CanonicalReport {
        let rows_in = self.observations.len();
        let reordered = self
            .observations
            .windows(2)
            .any(|w| w[0].timestamp_utc > w[1].timestamp_utc);

        // Stable sort, so same-date rows keep their arrival order and
        // dedup keeps the first of each date.
        self.observations.sort_by_key(|o| o.timestamp_utc);
        self.observations.dedup_by_key(|o| o.date);

        let rows_out = self.observations.len();
        CanonicalReport {
            rows_in,
            rows_out,
            duplicates_removed: rows_in - rows_out,
            reordered,
        }
    }

    /// Check the series invariants: dates unique and strictly increasing,
    /// every date consistent with its timestamp, closes finite.
    pub fn validate(&self) -> Result<(), SeriesError> {
        for obs in &self.observations {
            if !obs.close.is_finite() {
                return Err(SeriesError::BadClose { date: obs.date });
            }
            if obs.date != obs.timestamp_utc.date_naive() {
                return Err(SeriesError::DateMismatch { date: obs.date });
            }
        }
        for pair in self.observations.windows(2) {
            if pair[1].date == pair[0].date {
                return Err(SeriesError::DuplicateDate { date: pair[1].date });
            }
            if pair[1].date < pair[0].date {
                return Err(SeriesError::OutOfOrder { date: pair[1].date });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(day: u32, hour: u32, close: f64) -> PriceObservation {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc();
        PriceObservation::new(ts, close)
    }

    #[test]
    fn from_epoch_ms_derives_utc_date() {
        // 2024-01-02 00:00:00 UTC
        let o = PriceObservation::from_epoch_ms(1_704_153_600_000, 42_000.0).unwrap();
        assert_eq!(o.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(o.close, 42_000.0);
        assert!(o.volume.is_none());
        assert!(o.market_cap.is_none());
    }

    #[test]
    fn from_epoch_secs_matches_ms() {
        let a = PriceObservation::from_epoch_secs(1_704_153_600, 1.0).unwrap();
        let b = PriceObservation::from_epoch_ms(1_704_153_600_000, 1.0).unwrap();
        assert_eq!(a.date, b.date);
        assert_eq!(a.timestamp_utc, b.timestamp_utc);
    }

    #[test]
    fn canonicalize_sorts_and_dedups_keeping_first() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Coingecko);
        series.observations = vec![obs(3, 0, 120.0), obs(2, 0, 100.0), obs(2, 6, 101.0)];

        let report = series.canonicalize();

        assert_eq!(report.rows_in, 3);
        assert_eq!(report.rows_out, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert!(report.reordered);
        // Jan 2 keeps the 00:00 row, not the 06:00 duplicate.
        assert_eq!(series.observations[0].close, 100.0);
        assert_eq!(series.observations[1].close, 120.0);
        series.validate().unwrap();
    }

    #[test]
    fn canonicalize_clean_series_reports_no_changes() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Coingecko);
        series.observations = vec![obs(2, 0, 100.0), obs(3, 0, 110.0)];

        let report = series.canonicalize();

        assert_eq!(report.duplicates_removed, 0);
        assert!(!report.reordered);
        assert_eq!(report.rows_in, report.rows_out);
    }

    #[test]
    fn validate_rejects_duplicate_dates() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Yahoo);
        series.observations = vec![obs(2, 0, 100.0), obs(2, 6, 101.0)];

        assert!(matches!(
            series.validate(),
            Err(SeriesError::DuplicateDate { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_order_dates() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Yahoo);
        series.observations = vec![obs(3, 0, 100.0), obs(2, 0, 99.0)];

        assert!(matches!(
            series.validate(),
            Err(SeriesError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn validate_rejects_nan_close() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Exchange);
        series.observations = vec![obs(2, 0, f64::NAN)];

        assert!(matches!(
            series.validate(),
            Err(SeriesError::BadClose { .. })
        ));
    }

    #[test]
    fn validate_rejects_mismatched_date() {
        let mut series = PriceSeries::new("bitcoin", "usd", ProviderKind::Exchange);
        let mut o = obs(2, 0, 100.0);
        o.date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        series.observations = vec![o];

        assert!(matches!(
            series.validate(),
            Err(SeriesError::DateMismatch { .. })
        ));
    }

    #[test]
    fn provider_kind_name_round_trip() {
        for kind in ProviderKind::DEFAULT_ORDER {
            assert_eq!(ProviderKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_name("ftx"), None);
    }
}
