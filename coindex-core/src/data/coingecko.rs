//! CoinGecko market_chart adapter (primary source).
//!
//! One endpoint: `/coins/{id}/market_chart`, which returns three parallel
//! `[epoch_ms, value]` arrays (prices, market_caps, total_volumes) that we
//! join on the millisecond timestamp. Payloads go through the JSON disk
//! cache so repeated runs inside the TTL hit no network.
//!
//! Free-tier quirk: `days=max` is rejected with HTTP 401 and error code
//! 10012. On exactly that combination we retry once with `days=365` — one
//! year is the most the free tier will serve.

use crate::config::FetchConfig;
use crate::data::cache::JsonCache;
use crate::data::http::{HttpError, HttpFetcher};
use crate::data::provider::{Days, FetchRequest, PriceProvider, ProviderError};
use crate::domain::{PriceObservation, PriceSeries, ProviderKind};
use serde_json::Value;
use std::collections::BTreeMap;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Error code CoinGecko uses for endpoints above the current plan.
const FREE_TIER_LIMIT_CODE: i64 = 10012;

pub struct CoingeckoProvider {
    fetcher: HttpFetcher,
    cache: JsonCache,
}

impl CoingeckoProvider {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            fetcher: HttpFetcher::new(config.retry),
            cache: JsonCache::new(config.cache_root.join("coingecko"), config.cache_ttl),
        }
    }

    fn fetch_payload(&self, request: &FetchRequest) -> Result<Value, ProviderError> {
        let url = market_chart_url(&request.coin);
        let params = market_chart_params(&request.quote, &request.days.to_string());
        match self.fetcher.get_json(&url, &params) {
            Ok(payload) => Ok(payload),
            Err(HttpError::Status { status: 401, body })
                if request.days == Days::Max && is_free_tier_rejection(&body) =>
            {
                let retry_params = market_chart_params(&request.quote, "365");
                self.fetcher
                    .get_json(&url, &retry_params)
                    .map_err(ProviderError::from)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl PriceProvider for CoingeckoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Coingecko
    }

    fn fetch_daily(&self, request: &FetchRequest) -> Result<PriceSeries, ProviderError> {
        let key = cache_key(request);
        if let Some(payload) = self.cache.load_fresh(&key) {
            return parse_market_chart(&request.coin, &request.quote, &payload);
        }

        let payload = self.fetch_payload(request)?;
        self.cache.store(&key, &payload)?;
        parse_market_chart(&request.coin, &request.quote, &payload)
    }
}

fn market_chart_url(coin: &str) -> String {
    format!("{BASE_URL}/coins/{coin}/market_chart")
}

fn market_chart_params(quote: &str, days: &str) -> [(&'static str, String); 3] {
    [
        ("vs_currency", quote.to_string()),
        ("days", days.to_string()),
        ("interval", "daily".to_string()),
    ]
}

/// Cache key for one market_chart request. The `days` the caller asked
/// for is part of the key even when the free-tier retry serves less.
fn cache_key(request: &FetchRequest) -> String {
    format!(
        "{}_{}_{}_market_chart",
        request.coin, request.quote, request.days
    )
}

fn is_free_tier_rejection(body: &Value) -> bool {
    body.get("error")
        .and_then(|e| e.get("status"))
        .and_then(|s| s.get("error_code"))
        .and_then(Value::as_i64)
        == Some(FREE_TIER_LIMIT_CODE)
}

/// Join the three parallel arrays into a canonical series.
///
/// Prices drive the series; market cap and volume attach where a row with
/// the same millisecond timestamp exists.
fn parse_market_chart(
    coin: &str,
    quote: &str,
    payload: &Value,
) -> Result<PriceSeries, ProviderError> {
    let prices = pair_rows(payload, "prices");
    if prices.is_empty() {
        return Err(ProviderError::Empty {
            provider: ProviderKind::Coingecko,
            coin: coin.to_string(),
        });
    }

    let caps: BTreeMap<i64, f64> = pair_rows(payload, "market_caps").into_iter().collect();
    let volumes: BTreeMap<i64, f64> = pair_rows(payload, "total_volumes").into_iter().collect();

    let mut series = PriceSeries::new(coin, quote, ProviderKind::Coingecko);
    for (epoch_ms, close) in prices {
        let Some(mut obs) = PriceObservation::from_epoch_ms(epoch_ms, close) else {
            return Err(ProviderError::ResponseFormat(format!(
                "timestamp {epoch_ms} out of range"
            )));
        };
        obs.market_cap = caps.get(&epoch_ms).copied();
        obs.volume = volumes.get(&epoch_ms).copied();
        series.observations.push(obs);
    }

    series.canonicalize();
    Ok(series)
}

/// Read one of the `[[epoch_ms, value], …]` arrays. Rows that do not fit
/// the shape (null values, short arrays) are skipped.
fn pair_rows(payload: &Value, field: &str) -> Vec<(i64, f64)> {
    let Some(rows) = payload.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let ts = epoch_ms(row.first()?)?;
            let value = row.get(1)?.as_f64()?;
            Some((ts, value))
        })
        .collect()
}

/// Millisecond timestamps sometimes arrive as floats.
fn epoch_ms(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}
