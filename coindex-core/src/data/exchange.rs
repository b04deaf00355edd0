//! Exchange OHLCV adapter (tertiary source).
//!
//! Last resort: pull daily candles straight from exchange REST APIs.
//! Venue preference per coin: Kraken USD pairs first, then Binance USDT
//! pairs (USDT ~ USD). Each venue has its own wire codec. A venue
//! failure is recorded and the next venue tried; the adapter fails only
//! when every venue has, with an error naming each venue's failure.

use crate::config::FetchConfig;
use crate::data::http::HttpFetcher;
use crate::data::provider::{Days, FetchRequest, PriceProvider, ProviderError};
use crate::domain::{PriceObservation, PriceSeries, ProviderKind};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;

const KRAKEN_OHLC_URL: &str = "https://api.kraken.com/0/public/OHLC";
const BINANCE_KLINES_URL: &str = "https://api.binance.com/api/v3/klines";

/// Kraken serves at most this many candles per OHLC call (and in total —
/// the endpoint never reaches further back than 720 periods).
const KRAKEN_PAGE_ROWS: usize = 720;
/// Binance serves at most this many klines per call.
const BINANCE_PAGE_ROWS: usize = 1000;
/// Pause between pagination calls.
const PAGE_PAUSE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Venue {
    Kraken,
    Binance,
}

impl Venue {
    fn as_str(&self) -> &'static str {
        match self {
            Venue::Kraken => "kraken",
            Venue::Binance => "binance",
        }
    }
}

/// Venue preference per coin.
fn venue_pairs(coin: &str, quote: &str) -> Option<&'static [(Venue, &'static str)]> {
    match (coin, quote) {
        ("bitcoin", "usd") => Some(&[(Venue::Kraken, "XBTUSD"), (Venue::Binance, "BTCUSDT")]),
        ("ethereum", "usd") => Some(&[(Venue::Kraken, "ETHUSD"), (Venue::Binance, "ETHUSDT")]),
        _ => None,
    }
}

pub struct ExchangeProvider {
    fetcher: HttpFetcher,
}

impl ExchangeProvider {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            fetcher: HttpFetcher::new(config.retry),
        }
    }

    fn fetch_venue(
        &self,
        venue: Venue,
        pair: &str,
        days: Days,
    ) -> Result<Vec<PriceObservation>, ProviderError> {
        match venue {
            Venue::Kraken => self.kraken_daily(pair, days),
            Venue::Binance => self.binance_daily(pair, days),
        }
    }

    /// Kraken OHLC with interval=1440, paginated through `result.last`.
    fn kraken_daily(
        &self,
        pair: &str,
        days: Days,
    ) -> Result<Vec<PriceObservation>, ProviderError> {
        let mut observations = Vec::new();
        let mut since = start_cursor_secs(days);

        loop {
            let mut params = vec![
                ("pair", pair.to_string()),
                ("interval", "1440".to_string()),
            ];
            if let Some(cursor) = since {
                params.push(("since", cursor.to_string()));
            }

            let payload = self.fetcher.get_json(KRAKEN_OHLC_URL, &params)?;
            let (rows, last) = parse_kraken_page(&payload)?;
            let page_len = rows.len();
            observations.extend(rows);

            // A short page means we have caught up to the newest candle;
            // a stuck cursor means Kraken has nothing further.
            match last {
                Some(cursor) if page_len >= KRAKEN_PAGE_ROWS && Some(cursor) != since => {
                    since = Some(cursor);
                }
                _ => break,
            }
            std::thread::sleep(PAGE_PAUSE);
        }

        Ok(observations)
    }

    /// Binance klines with interval=1d, cursor = last close_time + 1.
    fn binance_daily(
        &self,
        symbol: &str,
        days: Days,
    ) -> Result<Vec<PriceObservation>, ProviderError> {
        let mut observations = Vec::new();
        let mut cursor = start_cursor_secs(days).map(|s| s * 1000).unwrap_or(0);

        loop {
            let params = [
                ("symbol", symbol.to_string()),
                ("interval", "1d".to_string()),
                ("startTime", cursor.to_string()),
                ("limit", BINANCE_PAGE_ROWS.to_string()),
            ];

            let payload = self.fetcher.get_json(BINANCE_KLINES_URL, &params)?;
            let rows = parse_binance_page(&payload)?;
            let page_len = rows.len();

            if let Some(newest) = rows.last() {
                cursor = newest.timestamp_utc.timestamp_millis() + 1;
            }
            observations.extend(rows);

            if page_len < BINANCE_PAGE_ROWS {
                break;
            }
            std::thread::sleep(PAGE_PAUSE);
        }

        Ok(observations)
    }
}

impl PriceProvider for ExchangeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Exchange
    }

    fn fetch_daily(&self, request: &FetchRequest) -> Result<PriceSeries, ProviderError> {
        let pairs = venue_pairs(&request.coin, &request.quote).ok_or_else(|| {
            ProviderError::NoMapping {
                provider: ProviderKind::Exchange,
                coin: request.coin.clone(),
            }
        })?;

        let mut failures: Vec<String> = Vec::new();
        for &(venue, pair) in pairs {
            match self.fetch_venue(venue, pair, request.days) {
                Ok(observations) if !observations.is_empty() => {
                    let mut series =
                        PriceSeries::new(&request.coin, &request.quote, ProviderKind::Exchange);
                    series.observations = observations;
                    series.canonicalize();
                    return Ok(series);
                }
                Ok(_) => failures.push(format!("{}: no rows for {pair}", venue.as_str())),
                Err(e) => failures.push(format!("{}: {e}", venue.as_str())),
            }
        }

        Err(ProviderError::VenuesExhausted {
            coin: request.coin.clone(),
            detail: failures.join("; "),
        })
    }
}

/// First pagination cursor: `None` for full history, otherwise the UTC
/// second `days` ago.
fn start_cursor_secs(days: Days) -> Option<i64> {
    match days {
        Days::Max => None,
        Days::Fixed(n) => Some(Utc::now().timestamp() - i64::from(n) * 86_400),
    }
}

/// One Kraken OHLC page: candle rows plus the `last` pagination cursor.
///
/// Candle rows are `[time_s, open, high, low, close, vwap, volume, count]`
/// with numeric strings. The result key is Kraken's own pair name (XBTUSD
/// comes back as XXBTZUSD), so we take whichever entry is not `last`.
fn parse_kraken_page(
    payload: &Value,
) -> Result<(Vec<PriceObservation>, Option<i64>), ProviderError> {
    if let Some(errors) = payload.get("error").and_then(Value::as_array) {
        if !errors.is_empty() {
            let detail: Vec<&str> = errors.iter().filter_map(Value::as_str).collect();
            return Err(ProviderError::Upstream(format!(
                "kraken: {}",
                detail.join(", ")
            )));
        }
    }

    let result = payload
        .get("result")
        .and_then(Value::as_object)
        .ok_or_else(|| ProviderError::ResponseFormat("kraken response has no result".into()))?;

    let last = result.get("last").and_then(num_i64);

    let rows = result
        .iter()
        .find(|(key, _)| key.as_str() != "last")
        .and_then(|(_, value)| value.as_array())
        .ok_or_else(|| ProviderError::ResponseFormat("kraken result has no candle rows".into()))?;

    let mut observations = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else { continue };
        let Some(time_s) = row.first().and_then(num_i64) else {
            continue;
        };
        let Some(close) = row.get(4).and_then(num_f64) else {
            continue;
        };
        let Some(mut obs) = PriceObservation::from_epoch_secs(time_s, close) else {
            continue;
        };
        obs.volume = row.get(6).and_then(num_f64);
        observations.push(obs);
    }

    Ok((observations, last))
}

/// One Binance klines page. Rows:
/// `[open_time_ms, open, high, low, close, volume, close_time_ms,
/// quote_volume, …]` with numeric strings. The date derives from
/// close_time; volume is the quote-asset volume so it is denominated in
/// the quote currency like the other providers'.
fn parse_binance_page(payload: &Value) -> Result<Vec<PriceObservation>, ProviderError> {
    let rows = payload
        .as_array()
        .ok_or_else(|| ProviderError::ResponseFormat("binance klines is not an array".into()))?;

    let mut observations = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(row) = row.as_array() else { continue };
        let Some(close_ms) = row.get(6).and_then(num_i64) else {
            continue;
        };
        let Some(close) = row.get(4).and_then(num_f64) else {
            continue;
        };
        let Some(mut obs) = PriceObservation::from_epoch_ms(close_ms, close) else {
            continue;
        };
        obs.volume = row.get(7).and_then(num_f64);
        observations.push(obs);
    }

    Ok(observations)
}

/// Exchange payloads mix numbers and numeric strings.
fn num_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn num_i64(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}
