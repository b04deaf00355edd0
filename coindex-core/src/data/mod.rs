//! Fetching, caching, and persistence of daily price series.

pub mod cache;
pub mod coingecko;
pub mod exchange;
pub mod fallback;
pub mod http;
pub mod provider;
pub mod store;
pub mod yahoo;

pub use cache::{cache_status, CacheEntry, CacheError, CacheFileStatus, JsonCache};
pub use coingecko::CoingeckoProvider;
pub use exchange::ExchangeProvider;
pub use fallback::{
    fetch_daily_series, FetchError, FetchOutcome, ProviderChoice, ProviderFailure,
};
pub use http::{HttpError, HttpFetcher};
pub use provider::{
    Days, FetchObserver, FetchRequest, ParseDaysError, PriceProvider, ProviderError,
    SilentObserver, StdoutObserver,
};
pub use store::{PriceStore, StoreError, StoreMeta};
pub use yahoo::YahooProvider;
