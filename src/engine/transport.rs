//! # Transport Module
//!
//! The boundary between the request engine and whatever actually moves bytes.
//! A [`RequestDescriptor`] is a replayable description of one call; a
//! [`Transport`] executes it once per attempt and hands back the raw response.

use crate::engine::error::ApiError;
use crate::engine::retry::RetryConfig;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// HTTP verbs the service accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Immutable, replayable description of one logical request
///
/// The engine may hand the same descriptor to the transport several times,
/// once per attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    /// Path relative to the transport's base URL, e.g. `/maps/api/geocode/json`
    pub path: String,
    /// Query parameters in insertion order
    pub params: Vec<(String, String)>,
    /// JSON body, only sent for `POST`
    pub body: Option<Value>,
    /// Overrides the client-wide retry configuration for this request
    pub retry: Option<RetryConfig>,
}

impl RequestDescriptor {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
            ..Default::default()
        }
    }

    /// Append a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Use a dedicated retry configuration for this request
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Undecoded response as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// JSON response with the given status
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport I/O failure: {0}")]
    Io(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => ApiError::Timeout(msg),
            TransportError::Connect(msg) => ApiError::Io(format!("connection failed: {msg}")),
            TransportError::Io(msg) => ApiError::Io(msg),
        }
    }
}

/// Executes a single attempt of a request
///
/// Implementations must tolerate being called repeatedly with the same
/// descriptor. Dropping the returned future abandons the call, which is how
/// cancellation reaches an in-flight request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<RawResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_builder() {
        let request = RequestDescriptor::get("/maps/api/geocode/json")
            .param("address", "1600 Amphitheatre Parkway")
            .param("language", "en");

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.params[0].0, "address");
        assert!(request.body.is_none());
        assert!(request.retry.is_none());

        let request = RequestDescriptor::post("/v1/geolocate", json!({"considerIp": true}));
        assert_eq!(request.method.as_str(), "POST");
        assert_eq!(request.body, Some(json!({"considerIp": true})));
    }

    #[test]
    fn test_transport_error_maps_to_io_family() {
        let err: ApiError = TransportError::Connect("refused".into()).into();
        assert!(err.is_io());
        assert!(!err.retryable());

        let err: ApiError = TransportError::Timeout("read".into()).into();
        assert_eq!(err, ApiError::Timeout("read".into()));
    }

    #[test]
    fn test_raw_response_success_range() {
        assert!(RawResponse::new(200, "{}").is_success());
        assert!(RawResponse::new(204, "").is_success());
        assert!(!RawResponse::new(503, "").is_success());
    }
}
