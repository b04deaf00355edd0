//! Yahoo chart API adapter (secondary source).
//!
//! Fetches daily closes from Yahoo's v8 chart API for the handful of
//! coins with listed crypto symbols (bitcoin → BTC-USD). Yahoo has no
//! official API and changes response formats without notice, so this is
//! a fallback path, never the primary one.

use crate::config::FetchConfig;
use crate::data::http::HttpFetcher;
use crate::data::provider::{FetchRequest, PriceProvider, ProviderError};
use crate::domain::{PriceObservation, PriceSeries, ProviderKind};
use chrono::Utc;
use serde::Deserialize;

/// Yahoo v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Coin ids with listed Yahoo symbols. Deliberately small: anything not
/// listed here is a configuration miss, and the chain moves on.
fn yahoo_symbol(coin: &str, quote: &str) -> Option<&'static str> {
    match (coin, quote) {
        ("bitcoin", "usd") => Some("BTC-USD"),
        ("ethereum", "usd") => Some("ETH-USD"),
        _ => None,
    }
}

pub struct YahooProvider {
    fetcher: HttpFetcher,
}

impl YahooProvider {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            fetcher: HttpFetcher::new(config.retry),
        }
    }
}

impl PriceProvider for YahooProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Yahoo
    }

    fn fetch_daily(&self, request: &FetchRequest) -> Result<PriceSeries, ProviderError> {
        let symbol =
            yahoo_symbol(&request.coin, &request.quote).ok_or_else(|| ProviderError::NoMapping {
                provider: ProviderKind::Yahoo,
                coin: request.coin.clone(),
            })?;

        let payload = self.fetcher.get_json(&chart_url(symbol), &chart_params())?;
        let chart: ChartResponse = serde_json::from_value(payload).map_err(|e| {
            ProviderError::ResponseFormat(format!("chart response for {symbol}: {e}"))
        })?;

        parse_chart(&request.coin, &request.quote, chart)
    }
}

fn chart_url(symbol: &str) -> String {
    format!("https://query2.finance.yahoo.com/v8/finance/chart/{symbol}")
}

/// Full daily history: epoch start through now. Crypto symbols trade
/// every day, so there is no range to trim.
fn chart_params() -> [(&'static str, String); 3] {
    [
        ("period1", "0".to_string()),
        ("period2", Utc::now().timestamp().to_string()),
        ("interval", "1d".to_string()),
    ]
}

/// Parse the chart response into a canonical series.
fn parse_chart(coin: &str, quote: &str, resp: ChartResponse) -> Result<PriceSeries, ProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) => ProviderError::Upstream(format!("{}: {}", err.code, err.description)),
        None => ProviderError::ResponseFormat("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormat("result array is empty".into()))?;

    let timestamps = data
        .timestamp
        .ok_or_else(|| ProviderError::ResponseFormat("no timestamps".into()))?;

    let quote_data = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ResponseFormat("no quote data".into()))?;

    let mut series = PriceSeries::new(coin, quote, ProviderKind::Yahoo);
    for (i, &ts) in timestamps.iter().enumerate() {
        // Null close = placeholder row; skip it.
        let Some(close) = quote_data.close.get(i).copied().flatten() else {
            continue;
        };
        let Some(mut obs) = PriceObservation::from_epoch_secs(ts, close) else {
            return Err(ProviderError::ResponseFormat(format!(
                "invalid timestamp: {ts}"
            )));
        };
        obs.volume = quote_data.volume.get(i).copied().flatten();
        series.observations.push(obs);
    }

    if series.is_empty() {
        return Err(ProviderError::Empty {
            provider: ProviderKind::Yahoo,
            coin: coin.to_string(),
        });
    }

    series.canonicalize();
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2024-01-01..03 at 00:00 UTC, in seconds.
    const D1: i64 = 1_704_067_200;
    const D2: i64 = 1_704_153_600;
    const D3: i64 = 1_704_240_000;

    fn chart(value: serde_json::Value) -> ChartResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn parse_reads_closes_and_volumes() {
        let resp = chart(json!({
            "chart": {
                "result": [{
                    "timestamp": [D1, D2, D3],
                    "indicators": {
                        "quote": [{
                            "close": [42000.0, 42500.0, 43000.0],
                            "volume": [20_000_000_000i64, 21_000_000_000i64, 19_000_000_000i64]
                        }]
                    }
                }],
                "error": null
            }
        }));

        let series = parse_chart("bitcoin", "usd", resp).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.source, ProviderKind::Yahoo);
        assert_eq!(series.observations[0].close, 42000.0);
        assert_eq!(series.observations[0].volume, Some(2.0e10));
        assert!(series.observations[0].market_cap.is_none());
        series.validate().unwrap();
    }

    #[test]
    fn parse_skips_null_quote_rows() {
        let resp = chart(json!({
            "chart": {
                "result": [{
                    "timestamp": [D1, D2, D3],
                    "indicators": {
                        "quote": [{
                            "close": [42000.0, null, 43000.0],
                            "volume": [1.0, null, 3.0]
                        }]
                    }
                }],
                "error": null
            }
        }));

        let series = parse_chart("bitcoin", "usd", resp).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.observations[1].close, 43000.0);
    }

    #[test]
    fn parse_surfaces_in_band_errors() {
        let resp = chart(json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found" }
            }
        }));

        let err = parse_chart("bitcoin", "usd", resp).unwrap_err();
        match err {
            ProviderError::Upstream(detail) => assert!(detail.contains("Not Found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_null_history_is_an_empty_result() {
        let resp = chart(json!({
            "chart": {
                "result": [{
                    "timestamp": [D1, D2],
                    "indicators": {
                        "quote": [{ "close": [null, null], "volume": [null, null] }]
                    }
                }],
                "error": null
            }
        }));

        let err = parse_chart("bitcoin", "usd", resp).unwrap_err();
        assert!(matches!(err, ProviderError::Empty { .. }), "{err:?}");
    }

    #[test]
    fn symbol_registry_covers_known_coins_only() {
        assert_eq!(yahoo_symbol("bitcoin", "usd"), Some("BTC-USD"));
        assert_eq!(yahoo_symbol("ethereum", "usd"), Some("ETH-USD"));
        assert_eq!(yahoo_symbol("dogecoin", "usd"), None);
        assert_eq!(yahoo_symbol("bitcoin", "eur"), None);
    }

    #[test]
    fn missing_mapping_is_a_config_error() {
        let config = FetchConfig::new(std::env::temp_dir());
        let provider = YahooProvider::new(&config);
        let err = provider
            .fetch_daily(&FetchRequest::new("dogecoin", "usd"))
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::NoMapping {
                provider: ProviderKind::Yahoo,
                ..
            }
        ));
    }
}
