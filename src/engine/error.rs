use thiserror::Error;

/// Main error type for the geo API client
///
/// Variants fall into the families callers usually want to tell apart:
/// application errors reported by the service (`Api`), transport-level
/// failures (`Http`, `Io`, `Timeout`), interruption (`Cancelled`, `Shutdown`)
/// and programming or configuration mistakes (`AlreadyConsumed`, `Config`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Application-level error decoded from the response body
    #[error("API error: {status}{}", message_suffix(.message))]
    Api {
        status: String,
        message: Option<String>,
    },

    /// HTTP status that is not a success and carried no usable body
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// I/O errors: connection failures, unreadable or malformed bodies
    #[error("IO error: {0}")]
    Io(String),

    /// The transport gave up waiting for the remote side
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Response payload could not be mapped onto the requested type
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// The request was cancelled through its pending result
    #[error("Request cancelled")]
    Cancelled,

    /// The admission scheduler stopped before the request could be sent
    #[error("Admission scheduler is shut down")]
    Shutdown,

    /// A pending result was consumed more than once
    #[error("Pending result already consumed")]
    AlreadyConsumed,

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" - {m}"))
        .unwrap_or_default()
}

/// Server error codes that indicate a transient condition
pub const RETRYABLE_HTTP_STATUSES: [u16; 3] = [500, 503, 504];

/// Application status the service uses for rate limiting
pub const OVER_QUERY_LIMIT: &str = "OVER_QUERY_LIMIT";

const DAILY_QUOTA_MARKER: &str = "daily request quota";

fn is_daily_quota(status: &str, message: Option<&str>) -> bool {
    status == OVER_QUERY_LIMIT
        && message.is_some_and(|m| m.to_lowercase().contains(DAILY_QUOTA_MARKER))
}

impl ApiError {
    /// Creates a new application error
    pub fn api<S: Into<String>>(status: S, message: Option<String>) -> Self {
        ApiError::Api {
            status: status.into(),
            message,
        }
    }

    /// Creates a new HTTP error
    pub fn http<S: Into<String>>(status: u16, message: S) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
        }
    }

    /// Convert from std::io::Error
    pub fn from_io(err: std::io::Error) -> Self {
        ApiError::Io(err.to_string())
    }

    /// Convert from serde_json::Error
    pub fn from_serde(err: serde_json::Error) -> Self {
        ApiError::Deserialization(err.to_string())
    }

    /// Determines if this error is worth another attempt
    ///
    /// Uses the default set of transient application statuses, which is just
    /// `OVER_QUERY_LIMIT`. See [`retryable_with`](Self::retryable_with).
    pub fn retryable(&self) -> bool {
        self.retryable_with([OVER_QUERY_LIMIT])
    }

    /// Determines if this error is worth another attempt, treating
    /// `api_statuses` as the transient application statuses
    ///
    /// Server-side 500/503/504 always qualify. An exhausted daily quota never
    /// does. Connection failures and timeouts are surfaced as I/O errors
    /// without being retried.
    pub fn retryable_with<I>(&self, api_statuses: I) -> bool
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        match self {
            ApiError::Http { status, .. } => RETRYABLE_HTTP_STATUSES.contains(status),
            ApiError::Api { status, message } => {
                api_statuses.into_iter().any(|s| s.as_ref() == status)
                    && !is_daily_quota(status, message.as_deref())
            }

            ApiError::Io(_) => false,
            ApiError::Timeout(_) => false,
            ApiError::Deserialization(_) => false,
            ApiError::Cancelled => false,
            ApiError::Shutdown => false,
            ApiError::AlreadyConsumed => false,
            ApiError::Config(_) => false,
        }
    }

    /// True for the I/O family: connection, timeout and body failures
    pub fn is_io(&self) -> bool {
        matches!(self, ApiError::Io(_) | ApiError::Timeout(_))
    }

    /// True when the request ended because someone asked it to stop
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled | ApiError::Shutdown)
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Api { .. } => "API_ERROR",
            ApiError::Http { .. } => "HTTP_ERROR",
            ApiError::Io(_) => "IO_ERROR",
            ApiError::Timeout(_) => "TIMEOUT_ERROR",
            ApiError::Deserialization(_) => "DESERIALIZATION_ERROR",
            ApiError::Cancelled => "CANCELLED",
            ApiError::Shutdown => "SHUTDOWN",
            ApiError::AlreadyConsumed => "ALREADY_CONSUMED",
            ApiError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::from_io(err)
    }
}

/// Type alias for Result with ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
