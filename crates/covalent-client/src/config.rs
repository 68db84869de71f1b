//! Client configuration and retry policy

use std::time::Duration;

use rand::Rng;
use url::Url;

use crate::error::{
    Error,
    Result,
};

/// Default public Covalent endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.covalenthq.com";

/// Items per page requested from `transactions_v2`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Configuration for a [`crate::CovalentClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: Url,
    pub chain_id: u64,
    pub api_key: String,
    pub page_size: u32,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Create a configuration for the given chain and API key, with the
    /// default endpoint, page size and retry policy.
    pub fn new(chain_id: u64, api_key: impl Into<String>) -> Self {
        Self {
            // The default endpoint is a known-good constant.
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            chain_id,
            api_key: api_key.into(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at a different endpoint (e.g. a local test server).
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)?;
        Ok(self)
    }

    pub fn with_page_size(mut self, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::Config("page size must be positive".to_string()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Bounded exponential backoff with jitter for transient request failures.
///
/// The delay before attempt `n` (zero-based) is `base_delay * 2^n`, capped at
/// `max_delay`, with the upper half of the interval randomized so concurrent
/// extractors do not hammer the API in lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Jittered delay before the given zero-based retry attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let half = exp / 2;
        let jitter_range = exp.saturating_sub(half);
        if jitter_range.is_zero() {
            return exp;
        }

        let jitter_ms = rand::rng().random_range(0..=jitter_range.as_millis() as u64);
        half + Duration::from_millis(jitter_ms)
    }
}
