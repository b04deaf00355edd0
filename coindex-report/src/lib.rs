//! Coindex Report — index performance metrics and factsheet rendering.
//!
//! This crate builds on `coindex-core` to provide:
//! - Pure metric functions over index level series (CAGR, annualized
//!   volatility, max drawdown)
//! - Markdown factsheet rendering and export to a reports directory

pub mod factsheet;
pub mod metrics;

pub use factsheet::{render_factsheet, save_factsheet};
pub use metrics::{IndexMetrics, PERIODS_PER_YEAR};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn index_metrics_is_send_sync() {
        assert_send::<IndexMetrics>();
        assert_sync::<IndexMetrics>();
    }
}
