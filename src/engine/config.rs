use crate::engine::error::{ApiError, OVER_QUERY_LIMIT, Result};
use crate::engine::http::HttpTransportConfig;
use crate::engine::retry::RetryConfig;
use crate::engine::scheduler::{DEFAULT_QUERIES_PER_SECOND, RateLimit, ShutdownPolicy};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted by [`ClientConfig::with_env_api_key`]
pub const API_KEY_ENV: &str = "GEOAPI_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Client configuration, loadable from JSON
///
/// Every field is optional in the JSON form and falls back to the defaults
/// below.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_queries_per_second: u32,
    /// Derived from `max_queries_per_second` when absent
    pub minimum_interval_ms: Option<u64>,
    /// Cumulative backoff budget; zero disables retries
    pub error_timeout_ms: u64,
    pub max_retries: Option<u32>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub experience_ids: Vec<String>,
    /// Application statuses that are retried rather than surfaced
    pub retryable_api_statuses: Vec<String>,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_queries_per_second: DEFAULT_QUERIES_PER_SECOND,
            minimum_interval_ms: None,
            error_timeout_ms: 60_000,
            max_retries: None,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 20_000,
            experience_ids: Vec::new(),
            retryable_api_statuses: vec![OVER_QUERY_LIMIT.to_string()],
            shutdown_policy: ShutdownPolicy::Drain,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(ApiError::from_serde)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json_str = fs::read_to_string(path)?;
        Self::from_json(&json_str)
    }

    /// Fill in the API key from `GEOAPI_API_KEY` unless one is already set
    pub fn with_env_api_key(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
        }
        self
    }

    /// Reject settings the client cannot run with
    ///
    /// `requires_key` is set when the built-in HTTP transport will be used.
    pub fn validate(&self, requires_key: bool) -> Result<()> {
        if self.max_queries_per_second == 0 {
            return Err(ApiError::Config(
                "max_queries_per_second must be greater than zero".to_string(),
            ));
        }
        if requires_key && self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ApiError::Config(
                "An API key is required for the HTTP transport".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit(&self) -> RateLimit {
        let limits = RateLimit::new(self.max_queries_per_second);
        match self.minimum_interval_ms {
            Some(ms) => limits.with_minimum_interval(Duration::from_millis(ms)),
            None => limits,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            error_timeout: Duration::from_millis(self.error_timeout_ms),
            max_retries: self.max_retries,
        }
    }

    pub fn http_transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            experience_ids: self.experience_ids.clone(),
        }
    }
}
