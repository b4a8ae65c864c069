//! # Response Decoding Module
//!
//! Turns a [`RawResponse`] into one of three outcomes the retry engine acts
//! on. The retry decision itself is [`ApiError::retryable_with`].

use crate::engine::error::{ApiError, OVER_QUERY_LIMIT, RETRYABLE_HTTP_STATUSES};
use crate::engine::transport::RawResponse;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Result of decoding one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// Decoded value, delivered as-is
    Success(T),
    /// Transient failure, the engine may try again
    Retryable(ApiError),
    /// Failure that another attempt will not fix
    Terminal(ApiError),
}

/// Decodes raw responses for one response type
pub trait Decoder<T>: Send + Sync {
    fn decode(&self, response: &RawResponse) -> Outcome<T>;
}

impl<T, F> Decoder<T> for F
where
    F: Fn(&RawResponse) -> Outcome<T> + Send + Sync,
{
    fn decode(&self, response: &RawResponse) -> Outcome<T> {
        self(response)
    }
}

/// Envelope shared by every JSON endpoint of the service
#[derive(Debug, Deserialize)]
struct Envelope {
    status: Option<String>,
    error_message: Option<String>,
}

const OK: &str = "OK";
const ZERO_RESULTS: &str = "ZERO_RESULTS";

/// Decoder for the service's `{ "status": ..., "error_message": ... }` bodies
#[derive(Debug, Clone)]
pub struct JsonDecoder<T> {
    retryable_statuses: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self::with_retryable_statuses([OVER_QUERY_LIMIT.to_string()])
    }

    /// Decoder that treats the given application statuses as transient
    pub fn with_retryable_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            retryable_statuses: statuses.into_iter().collect(),
            _marker: PhantomData,
        }
    }

    fn classify(&self, error: ApiError) -> Outcome<T> {
        if error.retryable_with(&self.retryable_statuses) {
            Outcome::Retryable(error)
        } else {
            Outcome::Terminal(error)
        }
    }
}

impl<T: DeserializeOwned> Decoder<T> for JsonDecoder<T> {
    fn decode(&self, response: &RawResponse) -> Outcome<T> {
        if RETRYABLE_HTTP_STATUSES.contains(&response.status) {
            return self.classify(ApiError::http(
                response.status,
                format!("Server error: {}", response.status),
            ));
        }

        let envelope: Envelope = match serde_json::from_str(&response.body) {
            Ok(envelope) => envelope,
            Err(e) if response.is_success() => {
                return Outcome::Terminal(ApiError::Io(format!(
                    "Malformed response body: {e}"
                )));
            }
            Err(_) => {
                return Outcome::Terminal(ApiError::http(
                    response.status,
                    format!("Unexpected response: {}", truncate(&response.body)),
                ));
            }
        };

        let status = envelope.status.unwrap_or_else(|| OK.to_string());
        if status == OK || status == ZERO_RESULTS {
            return match serde_json::from_str::<T>(&response.body) {
                Ok(value) => Outcome::Success(value),
                Err(e) => Outcome::Terminal(ApiError::from_serde(e)),
            };
        }

        self.classify(ApiError::api(status, envelope.error_message))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
