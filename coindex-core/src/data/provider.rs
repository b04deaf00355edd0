//! Price provider trait and structured error types.
//!
//! The PriceProvider trait abstracts over daily-close data sources
//! (CoinGecko, the Yahoo chart API, exchange OHLCV endpoints) so the
//! fallback chain can walk them uniformly and tests can mock them.

use crate::domain::{PriceSeries, ProviderKind};
use std::fmt;
use thiserror::Error;

/// How much history to request.
///
/// CoinGecko takes this verbatim as its `days` parameter; the exchange
/// adapters translate it into a start cursor. `Max` means everything the
/// provider has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Days {
    Max,
    Fixed(u32),
}

impl Days {
    pub fn parse(s: &str) -> Result<Self, ParseDaysError> {
        if s.eq_ignore_ascii_case("max") {
            return Ok(Days::Max);
        }
        match s.parse::<u32>() {
            Ok(n) if n > 0 => Ok(Days::Fixed(n)),
            _ => Err(ParseDaysError(s.to_string())),
        }
    }
}

impl fmt::Display for Days {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Days::Max => f.write_str("max"),
            Days::Fixed(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("invalid days value '{0}': expected 'max' or a positive day count")]
pub struct ParseDaysError(pub String);

/// One fetch: which asset, in which quote currency, over how much history.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Asset identifier (e.g. "bitcoin").
    pub coin: String,
    /// Quote currency (e.g. "usd").
    pub quote: String,
    pub days: Days,
}

impl FetchRequest {
    pub fn new(coin: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            quote: quote.into(),
            days: Days::Max,
        }
    }

    pub fn with_days(mut self, days: Days) -> Self {
        self.days = days;
        self
    }
}

/// Structured error types for provider fetches.
///
/// The fallback chain treats every variant as "this provider failed, try
/// the next one"; the distinctions matter for reporting and for tests.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    #[error("provider error: {0}")]
    Upstream(String),

    #[error("response format changed: {0}")]
    ResponseFormat(String),

    #[error("no {provider} mapping for '{coin}'")]
    NoMapping { provider: ProviderKind, coin: String },

    #[error("{provider} returned no rows for '{coin}'")]
    Empty { provider: ProviderKind, coin: String },

    #[error("cache error: {0}")]
    Cache(String),

    #[error("all venues failed for '{coin}': {detail}")]
    VenuesExhausted { coin: String, detail: String },
}

impl From<crate::data::http::HttpError> for ProviderError {
    fn from(e: crate::data::http::HttpError) -> Self {
        use crate::data::http::HttpError;
        match e {
            HttpError::Network(detail) => ProviderError::Network(detail),
            HttpError::RateLimited { attempts } => ProviderError::RateLimited { attempts },
            HttpError::Status { status, body } => ProviderError::Rejected {
                status,
                detail: truncate_body(&body),
            },
            HttpError::Body(detail) => ProviderError::ResponseFormat(detail),
        }
    }
}

impl From<crate::data::cache::CacheError> for ProviderError {
    fn from(e: crate::data::cache::CacheError) -> Self {
        ProviderError::Cache(e.to_string())
    }
}

/// Error bodies can be arbitrarily large; keep the printable part short.
fn truncate_body(body: &serde_json::Value) -> String {
    let mut text = body.to_string();
    if let Some((idx, _)) = text.char_indices().nth(200) {
        text.truncate(idx);
        text.push('…');
    }
    text
}

/// Trait for daily-close price providers.
///
/// Implementations handle the specifics of one upstream API, including
/// its caching and pagination. Each returns a canonicalized series
/// (sorted, one row per date) tagged with its own `ProviderKind`.
pub trait PriceProvider: Send + Sync {
    /// Which source this is; also the tag on returned series.
    fn kind(&self) -> ProviderKind;

    /// Fetch daily closes for the requested coin.
    fn fetch_daily(&self, request: &FetchRequest) -> Result<PriceSeries, ProviderError>;
}

/// Progress callback for fetch runs.
pub trait FetchObserver: Send {
    /// Called before a provider is tried.
    fn on_attempt(&self, provider: ProviderKind);

    /// Called when a provider fails and the chain moves on (or gives up).
    fn on_provider_failed(&self, provider: ProviderKind, error: &ProviderError);

    /// Called once, for the provider that succeeded.
    fn on_success(&self, provider: ProviderKind, rows: usize);
}

/// Progress reporter that prints `[info]`/`[warn]` lines.
pub struct StdoutObserver;

impl FetchObserver for StdoutObserver {
    fn on_attempt(&self, provider: ProviderKind) {
        println!("[info] trying {provider}...");
    }

    fn on_provider_failed(&self, provider: ProviderKind, error: &ProviderError) {
        eprintln!("[warn] {provider} failed: {error}");
    }

    fn on_success(&self, provider: ProviderKind, rows: usize) {
        println!("[info] {provider} returned {rows} rows");
    }
}

/// Observer that reports nothing. Used by tests and library callers that
/// do their own reporting.
pub struct SilentObserver;

impl FetchObserver for SilentObserver {
    fn on_attempt(&self, _provider: ProviderKind) {}
    fn on_provider_failed(&self, _provider: ProviderKind, _error: &ProviderError) {}
    fn on_success(&self, _provider: ProviderKind, _rows: usize) {}
}
