//! HTTP GET with exponential backoff.
//!
//! One shared plumbing layer for every provider adapter: issue a GET,
//! parse the JSON body, and retry transient failures (429 and the 5xx
//! gateway statuses) on a doubling, capped delay schedule. Any other
//! status is returned to the caller immediately with the decoded body so
//! adapters can inspect provider-specific error payloads.

use crate::config::RetryPolicy;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "coindex/0.1";

/// Structured errors for the HTTP layer.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("network unreachable: {0}")]
    Network(String),

    #[error("rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("unexpected HTTP status {status}")]
    Status { status: u16, body: Value },

    #[error("invalid response body: {0}")]
    Body(String),
}

/// Blocking JSON GET client with a retry schedule.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(retry: RetryPolicy) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");

        Self { client, retry }
    }

    /// GET a URL with query parameters and decode the JSON body.
    ///
    /// Retries 429/500/502/503/504 and connect/timeout errors with
    /// exponential backoff. Exhausting the schedule on retryable statuses
    /// yields `RateLimited`; any non-retryable status short-circuits with
    /// the decoded body attached.
    pub fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, HttpError> {
        let mut last_network: Option<String> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(&self.retry, attempt));
            }

            let response = match self.client.get(url).query(params).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_network = Some(e.to_string());
                    continue;
                }
                Err(e) => return Err(HttpError::Network(e.to_string())),
            };

            let status = response.status();
            let text = response
                .text()
                .map_err(|e| HttpError::Network(e.to_string()))?;

            if status.is_success() {
                return serde_json::from_str(&text).map_err(|e| HttpError::Body(e.to_string()));
            }

            if is_retryable(status.as_u16()) {
                last_network = None;
                continue;
            }

            // Non-retryable status: hand the body back so adapters can
            // inspect provider error payloads (e.g. CoinGecko error codes).
            let body = serde_json::from_str(&text)
                .unwrap_or_else(|_| serde_json::json!({ "error": text }));
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Err(match last_network {
            Some(detail) => HttpError::Network(detail),
            None => HttpError::RateLimited {
                attempts: self.retry.max_attempts,
            },
        })
    }
}

/// Transient statuses worth retrying.
fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Delay before `attempt` (1-based for the first retry): doubles from the
/// base, capped at the policy maximum. The doubling exponent is clamped
/// so a permissive attempt count cannot overflow the multiplier.
fn backoff_delay(retry: &RetryPolicy, attempt: u32) -> Duration {
    let doubling = 1u32 << attempt.saturating_sub(1).min(31);
    retry.base_delay.saturating_mul(doubling).min(retry.max_delay)
}
