//! Markdown factsheet rendering and export.
//!
//! A factsheet is a small, deterministic document: a title naming the
//! asset and base level, the three headline metrics as percentages, and
//! Data/Method/Notes lines identifying the free sources and the
//! normalize-first-close method.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use coindex_core::index::IndexSeries;

use crate::metrics::IndexMetrics;

// ─── Rendering ──────────────────────────────────────────────────────

/// Render the factsheet markdown for an index and its metrics.
pub fn render_factsheet(index: &IndexSeries, metrics: &IndexMetrics) -> String {
    let mut md = String::with_capacity(512);

    md.push_str(&format!(
        "# {} Close-only Index (Base={})\n",
        display_name(&index.coin),
        index.base
    ));
    md.push_str(&format!("- **CAGR:** {}\n", pct(metrics.cagr)));
    md.push_str(&format!("- **Annualized Vol:** {}\n", pct(metrics.ann_vol)));
    md.push_str(&format!(
        "- **Max Drawdown:** {}\n",
        pct(metrics.max_drawdown)
    ));
    if let Some((start, end)) = index.date_range() {
        md.push_str(&format!(
            "- **Period:** {start} to {end} ({} rows)\n",
            index.len()
        ));
    }
    md.push('\n');
    md.push_str("**Data:** Free sources (CoinGecko, Yahoo chart API, exchange OHLCV).  \n");
    md.push_str(&format!(
        "**Method:** Normalize first close to {}; record divisor.  \n",
        index.base
    ));
    md.push_str(&format!("**Notes:** {}\n", index.notes));

    md
}

/// Compute metrics for `index` and write its factsheet under `out_dir`.
///
/// The file name encodes coin and base: `{coin}_close_base{base}.md`.
/// Returns the written path.
pub fn save_factsheet(index: &IndexSeries, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create reports dir: {}", out_dir.display()))?;

    let metrics = IndexMetrics::compute(&index.levels());
    let md = render_factsheet(index, &metrics);

    let path = out_dir.join(format!("{}_close_base{}.md", index.coin, index.base));
    std::fs::write(&path, &md)
        .with_context(|| format!("failed to write factsheet: {}", path.display()))?;

    Ok(path)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Format a fraction as a two-decimal percentage: `0.1534` → `"15.34%"`.
fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Coin ids are lowercase slugs; uppercase the first letter for the title.
fn display_name(coin: &str) -> String {
    let mut chars = coin.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
