//! Index performance metrics — pure functions over index level series.
//!
//! Every metric is a pure function: slice of index levels in, scalar out.
//! No dependencies on the fetch pipeline or the store.

use serde::{Deserialize, Serialize};

/// Calendar-day annualization factor. Crypto trades every day, so daily
/// series carry 365 observations per year rather than 252.
pub const PERIODS_PER_YEAR: f64 = 365.0;

/// Headline metrics for one index series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexMetrics {
    pub cagr: f64,
    pub ann_vol: f64,
    pub max_drawdown: f64,
}

impl IndexMetrics {
    /// Compute all metrics from a series of index levels.
    pub fn compute(levels: &[f64]) -> Self {
        Self {
            cagr: cagr(levels),
            ann_vol: annualized_volatility(levels),
            max_drawdown: max_drawdown(levels),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Compound annual growth rate: `(last/first)^(365/n_returns) - 1`.
///
/// Returns 0.0 for series shorter than 2 levels or non-positive endpoints.
pub fn cagr(levels: &[f64]) -> f64 {
    if levels.len() < 2 {
        return 0.0;
    }
    let first = levels[0];
    let last = levels[levels.len() - 1];
    if first <= 0.0 || last <= 0.0 {
        return 0.0;
    }
    let n_returns = (levels.len() - 1) as f64;
    (last / first).powf(PERIODS_PER_YEAR / n_returns) - 1.0
}

/// Annualized volatility: sample standard deviation (ddof = 1) of daily
/// returns, scaled by `sqrt(365)`.
///
/// Returns 0.0 when there are fewer than 2 returns to estimate from.
pub fn annualized_volatility(levels: &[f64]) -> f64 {
    let returns = daily_returns(levels);
    std_dev(&returns) * PERIODS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Tracks the running peak and takes the minimum of `level / peak - 1`.
/// Returns 0.0 if the series is constant or monotonically increasing.
pub fn max_drawdown(levels: &[f64]) -> f64 {
    if levels.len() < 2 {
        return 0.0;
    }
    let mut peak = levels[0];
    let mut max_dd = 0.0_f64;

    for &level in levels {
        if level > peak {
            peak = level;
        }
        if peak > 0.0 {
            let dd = level / peak - 1.0;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Daily simple returns between consecutive levels.
pub fn daily_returns(levels: &[f64]) -> Vec<f64> {
    if levels.len() < 2 {
        return Vec::new();
    }
    levels
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
