//! Integration tests for the fetch → store → index pipeline.
//!
//! These tests drive the provider fallback chain with in-process providers,
//! persist the winning series through the Parquet store, and build an index
//! from what was read back from disk.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use coindex_core::data::{
    fetch_daily_series, FetchRequest, PriceProvider, PriceStore, ProviderChoice, ProviderError,
    SilentObserver,
};
use coindex_core::domain::{PriceObservation, PriceSeries, ProviderKind};
use coindex_core::index::{build_index, IndexSeries};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(label: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "coindex_pipeline_{label}_{}_{id}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Three successive daily closes starting 2024-01-01.
fn daily_series(source: ProviderKind, closes: &[f64]) -> PriceSeries {
    let day_ms = 86_400_000;
    let jan1_ms = 1_704_067_200_000;
    let mut series = PriceSeries::new("bitcoin", "usd", source);
    series.observations = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            PriceObservation::from_epoch_ms(jan1_ms + i as i64 * day_ms, close).unwrap()
        })
        .collect();
    series
}

struct FailingProvider {
    kind: ProviderKind,
}

impl PriceProvider for FailingProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn fetch_daily(&self, _request: &FetchRequest) -> Result<PriceSeries, ProviderError> {
        Err(ProviderError::Network("connection refused".to_string()))
    }
}

struct StaticProvider {
    kind: ProviderKind,
    closes: Vec<f64>,
}

impl PriceProvider for StaticProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn fetch_daily(&self, _request: &FetchRequest) -> Result<PriceSeries, ProviderError> {
        Ok(daily_series(self.kind, &self.closes))
    }
}

#[test]
fn fallback_fetch_store_and_index_end_to_end() {
    let primary = FailingProvider {
        kind: ProviderKind::Coingecko,
    };
    let secondary = StaticProvider {
        kind: ProviderKind::Yahoo,
        closes: vec![100.0, 110.0, 121.0],
    };
    let providers: [&dyn PriceProvider; 2] = [&primary, &secondary];
    let request = FetchRequest::new("bitcoin", "usd");

    let outcome = fetch_daily_series(
        &providers,
        &request,
        ProviderChoice::Auto,
        &SilentObserver,
    )
    .unwrap();
    assert_eq!(outcome.source(), ProviderKind::Yahoo);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].provider, ProviderKind::Coingecko);

    let store_dir = temp_dir("store");
    let store = PriceStore::new(&store_dir);
    let parquet_path = store.write(&outcome.series).unwrap();
    assert!(parquet_path.ends_with("yahoo/bitcoin_usd_daily.parquet"));

    let meta = store.meta(ProviderKind::Yahoo, "bitcoin", "usd").unwrap();
    assert_eq!(meta.row_count, 3);
    assert_eq!(meta.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(meta.end_date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());

    let loaded = store.load(ProviderKind::Yahoo, "bitcoin", "usd").unwrap();
    assert_eq!(loaded.closes(), vec![100.0, 110.0, 121.0]);

    let index = build_index(&loaded, 1000.0).unwrap();
    let levels = index.levels();
    assert_eq!(levels[0], 1000.0);
    assert!((levels[1] - 1100.0).abs() < 1e-9);
    assert!((levels[2] - 1210.0).abs() < 1e-9);
    assert_eq!(index.divisor, 0.1);
}

#[test]
fn forced_provider_does_not_touch_the_rest_of_the_chain() {
    let primary = FailingProvider {
        kind: ProviderKind::Coingecko,
    };
    let tertiary = StaticProvider {
        kind: ProviderKind::Exchange,
        closes: vec![50.0, 55.0],
    };
    let providers: [&dyn PriceProvider; 2] = [&primary, &tertiary];
    let request = FetchRequest::new("bitcoin", "usd");

    let outcome = fetch_daily_series(
        &providers,
        &request,
        ProviderChoice::Forced(ProviderKind::Exchange),
        &SilentObserver,
    )
    .unwrap();
    assert_eq!(outcome.source(), ProviderKind::Exchange);
    assert!(outcome.failures.is_empty());
}

#[test]
fn preferred_load_follows_provider_order_across_directories() {
    let store_dir = temp_dir("resolve");
    let store = PriceStore::new(&store_dir);

    store
        .write(&daily_series(ProviderKind::Exchange, &[9.0, 10.0]))
        .unwrap();
    store
        .write(&daily_series(ProviderKind::Yahoo, &[7.0, 8.0]))
        .unwrap();

    // Yahoo sits ahead of the exchange tier in the provider order.
    let series = store.load_preferred("bitcoin", "usd").unwrap();
    assert_eq!(series.source, ProviderKind::Yahoo);
    assert_eq!(series.closes(), vec![7.0, 8.0]);
}

#[test]
fn index_csv_written_from_pipeline_reads_back_identically() {
    let series = daily_series(ProviderKind::Coingecko, &[100.0, 110.0, 121.0]);
    let index = build_index(&series, 1000.0).unwrap();

    let out_dir = temp_dir("csv");
    let path = out_dir.join("bitcoin_usd_base1000.csv");
    index.write_csv(&path).unwrap();

    let reread = IndexSeries::read_csv(&path).unwrap();
    assert_eq!(reread.coin, "bitcoin");
    assert_eq!(reread.base, 1000.0);
    assert_eq!(reread.divisor, 0.1);
    assert_eq!(reread.notes, index.notes);
    assert_eq!(reread.rows, index.rows);
}
