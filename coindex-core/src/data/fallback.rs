//! Provider fallback chain.
//!
//! Walks an ordered provider slice (CoinGecko → Yahoo → exchange OHLCV by
//! default) until one succeeds. Every failure along the way is recorded
//! and carried on the successful outcome so callers can report which
//! sources were skipped and why. When the caller forces one provider,
//! the chain is bypassed entirely and that provider's failure propagates
//! as-is — no silent fallback.

use crate::data::provider::{FetchObserver, FetchRequest, PriceProvider, ProviderError};
use crate::domain::{PriceSeries, ProviderKind};
use std::fmt;
use thiserror::Error;

/// Which providers to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderChoice {
    /// Walk the chain in order until one succeeds.
    Auto,
    /// Use exactly this provider; fail fast on its error.
    Forced(ProviderKind),
}

/// One recorded provider failure.
#[derive(Debug)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// A successful fetch: the series plus every failure that preceded it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub series: PriceSeries,
    /// Providers that failed before `series.source` succeeded. Empty when
    /// the first provider answered.
    pub failures: Vec<ProviderFailure>,
}

impl FetchOutcome {
    /// The provider that produced the series.
    pub fn source(&self) -> ProviderKind {
        self.series.source
    }
}

/// Terminal fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A forced provider failed. No other provider was attempted.
    #[error("{provider}: {error}")]
    Forced {
        provider: ProviderKind,
        error: ProviderError,
    },

    /// Every provider in the chain failed.
    #[error("all providers failed: {}", describe_failures(.0))]
    Exhausted(Vec<ProviderFailure>),

    /// The forced provider is not in the configured chain.
    #[error("provider '{0}' is not configured")]
    NotConfigured(ProviderKind),
}

fn describe_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ProviderFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fetch one daily series through the provider chain.
///
/// `providers` is consulted in slice order. The returned outcome carries
/// the series tagged with the provider that produced it, plus every
/// recorded failure.
pub fn fetch_daily_series(
    providers: &[&dyn PriceProvider],
    request: &FetchRequest,
    choice: ProviderChoice,
    observer: &dyn FetchObserver,
) -> Result<FetchOutcome, FetchError> {
    if let ProviderChoice::Forced(kind) = choice {
        let provider = providers
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or(FetchError::NotConfigured(kind))?;

        observer.on_attempt(kind);
        return match provider.fetch_daily(request) {
            Ok(series) => {
                observer.on_success(kind, series.len());
                Ok(FetchOutcome {
                    series,
                    failures: Vec::new(),
                })
            }
            Err(error) => {
                observer.on_provider_failed(kind, &error);
                Err(FetchError::Forced {
                    provider: kind,
                    error,
                })
            }
        };
    }

    let mut failures = Vec::new();
    for provider in providers {
        let kind = provider.kind();
        observer.on_attempt(kind);
        match provider.fetch_daily(request) {
            Ok(series) => {
                observer.on_success(kind, series.len());
                return Ok(FetchOutcome { series, failures });
            }
            Err(error) => {
                observer.on_provider_failed(kind, &error);
                failures.push(ProviderFailure {
                    provider: kind,
                    error,
                });
            }
        }
    }

    Err(FetchError::Exhausted(failures))
}
