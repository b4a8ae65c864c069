use rand::Rng;
use std::time::Duration;

/// Default cumulative backoff budget before a failing request gives up
pub const DEFAULT_ERROR_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Budget of cumulative backoff time; zero disables retries
    pub error_timeout: Duration,
    /// Optional cap on the number of retries beyond the first attempt
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            error_timeout: DEFAULT_ERROR_TIMEOUT,
            max_retries: None,
        }
    }
}

impl RetryConfig {
    /// A configuration under which the first failure is terminal
    pub fn disabled() -> Self {
        Self {
            error_timeout: Duration::ZERO,
            max_retries: Some(0),
        }
    }

    pub fn with_error_timeout(mut self, error_timeout: Duration) -> Self {
        self.error_timeout = error_timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: Option<u32>) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Un-jittered delay before retry number `retry_count` (1-based)
    ///
    /// `0.5s * 1.5^(retry_count - 1)`; zero for the first attempt.
    pub fn base_delay(retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry_count - 1).unwrap_or(i32::MAX);
        Duration::from_secs_f64(0.5 * 1.5_f64.powi(exponent))
    }

    /// Calculate the jittered delay for a given retry attempt
    ///
    /// The base delay is scaled by a uniform factor in `[0.5, 1.5)` and
    /// truncated to whole milliseconds.
    pub fn calculate_delay(retry_count: u32) -> Duration {
        let factor = rand::rng().random_range(0.5..1.5);
        Self::jittered(Self::base_delay(retry_count), factor)
    }

    fn jittered(base: Duration, factor: f64) -> Duration {
        let millis = (base.as_secs_f64() * factor * 1000.0) as u64;
        Duration::from_millis(millis)
    }
}

/// Per-request retry bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempts made beyond the first
    pub retry_count: u32,
    /// Backoff already committed to, including the sleep in progress
    pub cumulative_backoff: Duration,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether another attempt fits the budget
    pub fn should_retry(&self, config: &RetryConfig) -> bool {
        if self.cumulative_backoff >= config.error_timeout {
            return false;
        }
        match config.max_retries {
            Some(max) => self.retry_count < max,
            None => true,
        }
    }

    /// Advance to the next attempt and return how long to sleep before it
    ///
    /// The delay is charged to `cumulative_backoff` before the caller sleeps,
    /// so the following budget check already accounts for it.
    pub fn begin_backoff(&mut self) -> Duration {
        self.retry_count += 1;
        let delay = RetryConfig::calculate_delay(self.retry_count);
        self.cumulative_backoff += delay;
        delay
    }
}
