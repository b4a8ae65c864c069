//! # Client Module
//!
//! [`GeoApiClient`] ties one admission scheduler, one transport and the retry
//! defaults together. Every request submitted through the same client shares
//! the same rate limit.

use crate::engine::config::ClientConfig;
use crate::engine::decode::{Decoder, JsonDecoder};
use crate::engine::error::{ApiError, Result};
use crate::engine::executor::RetryEngine;
use crate::engine::http::HttpTransport;
use crate::engine::pending::PendingResult;
use crate::engine::retry::RetryConfig;
use crate::engine::scheduler::{AdmissionScheduler, RateLimit, ShutdownPolicy};
use crate::engine::transport::{RequestDescriptor, Transport};
use log::info;
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Entry point for issuing rate-limited, retried requests
#[derive(Clone)]
pub struct GeoApiClient {
    scheduler: AdmissionScheduler,
    transport: Arc<dyn Transport>,
    retry: Arc<RwLock<RetryConfig>>,
    retryable_api_statuses: Arc<Vec<String>>,
}

impl GeoApiClient {
    pub fn builder() -> GeoApiClientBuilder {
        GeoApiClientBuilder::default()
    }

    /// Build a client with the HTTP transport from a configuration value
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        GeoApiClientBuilder {
            config,
            transport: None,
        }
        .build()
    }

    /// Submit a request with a caller-supplied decoder
    pub fn submit<T: Send + 'static>(
        &self,
        request: RequestDescriptor,
        decoder: Arc<dyn Decoder<T>>,
    ) -> PendingResult<T> {
        if self.scheduler.is_shutdown() {
            return PendingResult::settled(Err(ApiError::Shutdown), self.scheduler.runtime().clone());
        }
        RetryEngine::new(
            request,
            decoder,
            Arc::clone(&self.transport),
            self.scheduler.clone(),
            self.retry_config(),
        )
        .spawn()
    }

    /// Submit a request whose body is decoded by the standard JSON decoder
    pub fn get<T>(&self, request: RequestDescriptor) -> PendingResult<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let decoder = JsonDecoder::<T>::with_retryable_statuses(
            self.retryable_api_statuses.iter().cloned(),
        );
        self.submit(request, Arc::new(decoder))
    }

    /// Change pacing for requests admitted from now on
    pub fn configure(&self, limits: RateLimit) {
        self.scheduler.configure(limits);
    }

    /// Change the default retry policy for requests submitted from now on
    pub fn set_retry_config(&self, retry: RetryConfig) {
        *self.retry.write().unwrap_or_else(PoisonError::into_inner) = retry;
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn scheduler(&self) -> &AdmissionScheduler {
        &self.scheduler
    }

    /// Stop the scheduler according to its shutdown policy
    pub async fn shutdown(&self) {
        info!("Shutting down geo API client");
        self.scheduler.shutdown_and_wait().await;
    }
}

/// Builder for [`GeoApiClient`]
#[derive(Default)]
pub struct GeoApiClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl GeoApiClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Maximum requests per second; also resets the minimum interval to its
    /// derived default
    pub fn query_rate_limit(mut self, max_queries_per_second: u32) -> Self {
        self.config.max_queries_per_second = max_queries_per_second;
        self.config.minimum_interval_ms = None;
        self
    }

    pub fn minimum_interval(mut self, interval: Duration) -> Self {
        self.config.minimum_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    /// Cumulative backoff budget for retryable failures
    pub fn retry_timeout(mut self, timeout: Duration) -> Self {
        self.config.error_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = Some(max_retries);
        self
    }

    pub fn disable_retries(mut self) -> Self {
        self.config.error_timeout_ms = 0;
        self.config.max_retries = Some(0);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn experience_id(mut self, experience_id: impl Into<String>) -> Self {
        self.config.experience_ids.push(experience_id.into());
        self
    }

    /// Toggle whether an application status is retried
    pub fn retry_api_status(mut self, status: impl Into<String>, retry: bool) -> Self {
        let status = status.into();
        self.config.retryable_api_statuses.retain(|s| *s != status);
        if retry {
            self.config.retryable_api_statuses.push(status);
        }
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    /// Use a custom transport instead of the built-in HTTP one
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and start the admission scheduler
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<GeoApiClient> {
        let config = self.config;
        config.validate(self.transport.is_none())?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config.http_transport_config())?),
        };
        let scheduler = AdmissionScheduler::start(config.rate_limit(), config.shutdown_policy)?;

        Ok(GeoApiClient {
            scheduler,
            transport,
            retry: Arc::new(RwLock::new(config.retry_config())),
            retryable_api_statuses: Arc::new(config.retryable_api_statuses),
        })
    }
}
