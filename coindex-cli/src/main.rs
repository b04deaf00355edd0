//! Coindex CLI — pull, index, factsheet, and cache management commands.
//!
//! Commands:
//! - `pull` — fetch daily prices through the provider fallback chain, store as Parquet
//! - `index` — build a base-normalized index CSV from stored prices
//! - `factsheet` — compute metrics and render a markdown factsheet from an index CSV
//! - `cache status` — report cached payloads, sizes, and freshness

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use coindex_core::config::FetchConfig;
use coindex_core::data::{
    cache_status, fetch_daily_series, CoingeckoProvider, Days, ExchangeProvider, FetchOutcome,
    FetchRequest, PriceProvider, PriceStore, ProviderChoice, StdoutObserver, YahooProvider,
};
use coindex_core::domain::ProviderKind;
use coindex_core::index::{build_index, IndexSeries, DEFAULT_BASE};
use coindex_report::{save_factsheet, IndexMetrics};

#[derive(Parser)]
#[command(
    name = "coindex",
    about = "Coindex CLI — daily crypto price history and base-normalized indexes"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch daily price history through the provider fallback chain and store as Parquet.
    Pull {
        /// Coin id (e.g., bitcoin, ethereum).
        #[arg(long)]
        coin: String,

        /// Quote currency.
        #[arg(long, default_value = "usd")]
        quote: String,

        /// History window: 'max' or a number of days.
        #[arg(long, default_value = "max")]
        days: String,

        /// Provider: auto, coingecko, yahoo, exchange.
        #[arg(long, default_value = "auto")]
        provider: String,

        /// Root output directory (provider subfolder auto-added).
        #[arg(long, default_value = "data/raw")]
        out_dir: PathBuf,

        /// Cache directory for raw JSON payloads. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Optional coindex.toml with cache and retry settings.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Build a base-normalized index CSV from stored prices.
    Index {
        /// Coin id (e.g., bitcoin, ethereum).
        #[arg(long)]
        coin: String,

        /// Quote currency.
        #[arg(long, default_value = "usd")]
        quote: String,

        /// Level assigned to the first close.
        #[arg(long, default_value_t = DEFAULT_BASE)]
        base: f64,

        /// Root directory holding pulled prices.
        #[arg(long, default_value = "data/raw")]
        prices_dir: PathBuf,

        /// Output CSV path. Defaults to data/processed/indexes/{coin}_{quote}_base{base}.csv.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compute metrics and render a markdown factsheet from an index CSV.
    Factsheet {
        /// Index CSV produced by the `index` command.
        #[arg(long)]
        index: PathBuf,

        /// Output directory for the markdown file.
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,

        /// Coin id override when the CSV file name does not carry it.
        #[arg(long)]
        coin: Option<String>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached payloads, sizes, and freshness.
    Status {
        /// Cache directory. Overrides the config file.
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Optional coindex.toml with cache and retry settings.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pull {
            coin,
            quote,
            days,
            provider,
            out_dir,
            cache_dir,
            config,
        } => run_pull(coin, quote, days, provider, out_dir, cache_dir, config),
        Commands::Index {
            coin,
            quote,
            base,
            prices_dir,
            out,
        } => run_index(coin, quote, base, prices_dir, out),
        Commands::Factsheet {
            index,
            out_dir,
            coin,
        } => run_factsheet(index, out_dir, coin),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir, config } => run_cache_status(cache_dir, config),
        },
    }
}

fn run_pull(
    coin: String,
    quote: String,
    days: String,
    provider: String,
    out_dir: PathBuf,
    cache_dir: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<()> {
    let days = Days::parse(&days)?;
    let choice = parse_provider(&provider)?;
    let fetch_config = load_config(config.as_deref(), cache_dir)?;

    println!("[info] starting pull for coin={coin} provider={provider} days={days}");

    let coingecko = CoingeckoProvider::new(&fetch_config);
    let yahoo = YahooProvider::new(&fetch_config);
    let exchange = ExchangeProvider::new(&fetch_config);
    let providers: [&dyn PriceProvider; 3] = [&coingecko, &yahoo, &exchange];

    let request = FetchRequest::new(&coin, &quote).with_days(days);
    let outcome = fetch_daily_series(&providers, &request, choice, &StdoutObserver)?;

    let store = PriceStore::new(&out_dir);
    let path = store.write(&outcome.series)?;

    print_pull_summary(&outcome, &path);
    Ok(())
}

fn run_index(
    coin: String,
    quote: String,
    base: f64,
    prices_dir: PathBuf,
    out: Option<PathBuf>,
) -> Result<()> {
    let store = PriceStore::new(&prices_dir);
    let series = store.load_preferred(&coin, &quote)?;
    let index = build_index(&series, base)?;

    let out_path = out.unwrap_or_else(|| default_index_path(&coin, &quote, base));
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create index dir: {}", parent.display()))?;
    }
    index.write_csv(&out_path)?;

    println!(
        "Wrote {} rows={} (source={})",
        out_path.display(),
        index.len(),
        series.source
    );
    Ok(())
}

fn run_factsheet(index_path: PathBuf, out_dir: PathBuf, coin: Option<String>) -> Result<()> {
    let mut index = IndexSeries::read_csv(&index_path)
        .with_context(|| format!("failed to read index csv: {}", index_path.display()))?;
    if let Some(coin) = coin {
        index.coin = coin;
    }

    let metrics = IndexMetrics::compute(&index.levels());
    let path = save_factsheet(&index, &out_dir)?;

    print_factsheet_summary(&index, &metrics, &path);
    Ok(())
}

fn run_cache_status(cache_dir: Option<PathBuf>, config: Option<PathBuf>) -> Result<()> {
    let fetch_config = load_config(config.as_deref(), cache_dir)?;
    let root = &fetch_config.cache_root;

    if !root.exists() {
        println!("Cache directory does not exist: {}", root.display());
        return Ok(());
    }

    let statuses = cache_status(root, fetch_config.cache_ttl);
    if statuses.is_empty() {
        println!("Cache is empty: {}", root.display());
        return Ok(());
    }

    let total_size: u64 = statuses.iter().map(|s| s.size_bytes).sum();
    let fresh_count = statuses.iter().filter(|s| s.fresh).count();

    println!("Cache: {}", root.display());
    println!("Files: {} ({fresh_count} fresh)", statuses.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<10} {:<46} {:<7} {:<8} {:>10}",
        "Provider", "File", "State", "Age", "Size"
    );
    println!("{}", "-".repeat(85));
    for status in &statuses {
        let state = if status.fresh { "fresh" } else { "stale" };
        println!(
            "{:<10} {:<46} {:<7} {:<8} {:>10}",
            status.provider,
            status.file,
            state,
            format_age(status.fetched_at),
            format_size(status.size_bytes)
        );
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Explicit flag beats the config file beats the default cache root.
fn load_config(config_path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<FetchConfig> {
    let mut config = match config_path {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => FetchConfig::new("data/cache"),
    };
    if let Some(dir) = cache_dir {
        config.cache_root = dir;
    }
    Ok(config)
}

fn parse_provider(name: &str) -> Result<ProviderChoice> {
    if name.eq_ignore_ascii_case("auto") {
        return Ok(ProviderChoice::Auto);
    }
    match ProviderKind::from_name(name) {
        Some(kind) => Ok(ProviderChoice::Forced(kind)),
        None => bail!("unknown provider '{name}'. Valid: auto, coingecko, yahoo, exchange"),
    }
}

fn default_index_path(coin: &str, quote: &str, base: f64) -> PathBuf {
    PathBuf::from("data/processed/indexes").join(format!("{coin}_{quote}_base{base}.csv"))
}

fn format_age(fetched_at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    let Some(fetched) = fetched_at else {
        return "unknown".to_string();
    };
    let age = chrono::Utc::now() - fetched;
    if age.num_hours() >= 24 {
        format!("{}d", age.num_days())
    } else if age.num_hours() >= 1 {
        format!("{}h", age.num_hours())
    } else {
        format!("{}m", age.num_minutes().max(0))
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_pull_summary(outcome: &FetchOutcome, path: &Path) {
    let series = &outcome.series;
    println!();
    println!("=== Pull Result ===");
    println!("Coin:           {}", series.coin);
    println!("Quote:          {}", series.quote);
    println!("Provider:       {}", series.source);
    println!("Rows:           {}", series.len());
    if let Some((start, end)) = series.date_range() {
        println!("Period:         {start} to {end}");
    }
    for failure in &outcome.failures {
        println!("Fallback:       {failure}");
    }
    println!("File:           {}", path.display());
    println!();
}

fn print_factsheet_summary(index: &IndexSeries, metrics: &IndexMetrics, path: &Path) {
    println!();
    println!("=== Index Factsheet ===");
    println!("Coin:           {}", index.coin);
    println!("Base:           {}", index.base);
    println!("Divisor:        {}", index.divisor);
    println!("Rows:           {}", index.len());
    if let Some((start, end)) = index.date_range() {
        println!("Period:         {start} to {end}");
    }
    println!();
    println!("--- Performance ---");
    println!("CAGR:           {:.2}%", metrics.cagr * 100.0);
    println!("Annualized Vol: {:.2}%", metrics.ann_vol * 100.0);
    println!("Max Drawdown:   {:.2}%", metrics.max_drawdown * 100.0);
    println!();
    println!("Factsheet saved to: {}", path.display());
}
