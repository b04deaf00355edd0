//! Domain types shared across the fetch, store, and index layers.

pub mod observation;

pub use observation::{
    CanonicalReport, PriceObservation, PriceSeries, ProviderKind, SeriesError,
};
