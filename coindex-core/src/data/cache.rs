//! JSON payload cache with TTL.
//!
//! Raw provider responses are cached on disk so repeated runs within the
//! TTL hit no network at all. Layout: `{root}/{key}_{hash8}.json`, where
//! the key is sanitized for the filesystem and the hash disambiguates
//! keys that collide after sanitization.
//!
//! Each file holds a `CacheEntry` envelope: the fetch timestamp plus the
//! untouched payload. Writes are atomic (write to .tmp, rename into place).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Envelope stored on disk: payload plus its fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub payload: Value,
}

/// Structured errors for cache writes.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error: {0}")]
    Io(String),

    #[error("cache serialization error: {0}")]
    Serialize(String),
}

/// One provider's payload cache directory.
#[derive(Debug, Clone)]
pub struct JsonCache {
    root: PathBuf,
    ttl: Duration,
}

impl JsonCache {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(file_name(key))
    }

    /// Load a cached payload if it exists and is still within the TTL.
    ///
    /// Stale, missing, or unreadable entries all come back as `None`;
    /// corrupt files are reported on stderr and treated as misses.
    pub fn load_fresh(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        let content = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!(
                    "WARNING: ignoring corrupt cache file {}: {e}",
                    path.display()
                );
                return None;
            }
        };

        let max_age = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let age = Utc::now().signed_duration_since(entry.fetched_at);
        if age > max_age {
            return None;
        }
        Some(entry.payload)
    }

    /// Store a payload under a key, stamped with the current time.
    ///
    /// Returns the path written. The write goes to a temp file first and
    /// is renamed into place.
    pub fn store(&self, key: &str, payload: &Value) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.root)
            .map_err(|e| CacheError::Io(format!("failed to create cache dir: {e}")))?;

        let entry = CacheEntry {
            fetched_at: Utc::now(),
            payload: payload.clone(),
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| CacheError::Serialize(e.to_string()))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| CacheError::Io(format!("cache write: {e}")))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io(format!("atomic rename failed: {e}"))
        })?;

        Ok(path)
    }
}

/// Status of one cached payload, for operator-facing reporting.
#[derive(Debug, Clone)]
pub struct CacheFileStatus {
    pub provider: String,
    pub file: String,
    pub fetched_at: Option<DateTime<Utc>>,
    pub fresh: bool,
    pub size_bytes: u64,
}

/// Inspect every cached payload under `{cache_root}/{provider}/`.
pub fn cache_status(cache_root: &Path, ttl: Duration) -> Vec<CacheFileStatus> {
    let mut statuses = Vec::new();
    let Ok(providers) = fs::read_dir(cache_root) else {
        return statuses;
    };

    let max_age = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

    for provider in providers.flatten() {
        let provider_name = provider.file_name().to_string_lossy().to_string();
        let Ok(entries) = fs::read_dir(provider.path()) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let fetched_at = fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str::<CacheEntry>(&content).ok())
                .map(|e| e.fetched_at);
            let fresh = fetched_at
                .map(|ts| Utc::now().signed_duration_since(ts) <= max_age)
                .unwrap_or(false);
            statuses.push(CacheFileStatus {
                provider: provider_name.clone(),
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                fetched_at,
                fresh,
                size_bytes,
            });
        }
    }

    statuses.sort_by(|a, b| (&a.provider, &a.file).cmp(&(&b.provider, &b.file)));
    statuses
}

/// Filesystem-safe name for a cache key.
fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let digest = blake3::hash(key.as_bytes()).to_hex();
    format!("{safe}_{}.json", &digest.as_str()[..8])
}
