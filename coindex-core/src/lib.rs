//! coindex Core — domain types, provider adapters, fallback chain, stores.
//!
//! This crate contains everything between the provider HTTP APIs and the
//! index CSV on disk:
//! - Domain types (price observations, canonical daily series)
//! - HTTP GET with exponential backoff and a TTL'd JSON payload cache
//! - Provider adapters: CoinGecko, Yahoo chart API, exchange OHLCV
//! - Fallback chain that walks providers in preference order
//! - Parquet price store with metadata sidecars
//! - Base-normalized index builder and its CSV round-trip

pub mod config;
pub mod data;
pub mod domain;
pub mod index;
