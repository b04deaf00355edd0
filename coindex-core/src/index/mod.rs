//! Base-normalized index construction and its CSV artifact.

pub mod builder;

pub use builder::{build_index, IndexError, IndexRow, IndexSeries, DEFAULT_BASE};
