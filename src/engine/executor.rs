//! # Retry Execution Module
//!
//! Drives one logical request through admission, transport and decoding,
//! retrying retryable failures until the request succeeds, fails terminally
//! or runs out of retry budget.

use crate::engine::decode::{Decoder, Outcome};
use crate::engine::error::{ApiError, Result};
use crate::engine::pending::PendingResult;
use crate::engine::retry::{RetryConfig, RetryState};
use crate::engine::scheduler::AdmissionScheduler;
use crate::engine::transport::{RequestDescriptor, Transport};
use log::{debug, error, warn};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Retry engine for a single logical request
///
/// Attempts are strictly sequential: the next one is only submitted after the
/// previous attempt's response has been received and classified.
pub struct RetryEngine<T> {
    id: Uuid,
    request: Arc<RequestDescriptor>,
    decoder: Arc<dyn Decoder<T>>,
    transport: Arc<dyn Transport>,
    scheduler: AdmissionScheduler,
    config: RetryConfig,
    state: RetryState,
    cancel: CancellationToken,
}

impl<T: Send + 'static> RetryEngine<T> {
    pub fn new(
        request: RequestDescriptor,
        decoder: Arc<dyn Decoder<T>>,
        transport: Arc<dyn Transport>,
        scheduler: AdmissionScheduler,
        default_retry: RetryConfig,
    ) -> Self {
        let config = request.retry.clone().unwrap_or(default_retry);
        Self {
            id: Uuid::now_v7(),
            request: Arc::new(request),
            decoder,
            transport,
            scheduler,
            config,
            state: RetryState::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Start driving the request and hand back its pending result
    pub fn spawn(self) -> PendingResult<T> {
        let (tx, rx) = oneshot::channel();
        let cancel = self.cancel.clone();
        let runtime = self.scheduler.runtime().clone();

        runtime.spawn(async move {
            let id = self.id;
            let token = self.cancel.clone();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Request {id} cancelled");
                    Err(ApiError::Cancelled)
                }
                outcome = self.run() => outcome,
            };
            let _ = tx.send(outcome);
        });

        PendingResult::new(rx, cancel, runtime)
    }

    /// Run attempts until a terminal outcome
    pub async fn run(mut self) -> Result<T> {
        loop {
            let error = match self.attempt().await? {
                Outcome::Success(value) => {
                    debug!(
                        "Request {} {} succeeded after {} retries",
                        self.id, self.request.path, self.state.retry_count
                    );
                    return Ok(value);
                }
                Outcome::Terminal(e) => {
                    error!("Request {} {} failed: {e}", self.id, self.request.path);
                    return Err(e);
                }
                Outcome::Retryable(e) => e,
            };

            if !self.state.should_retry(&self.config) {
                error!(
                    "Request {} {} giving up after {} retries ({:?} backoff): {error}",
                    self.id, self.request.path, self.state.retry_count, self.state.cumulative_backoff
                );
                return Err(error);
            }

            let delay = self.state.begin_backoff();
            warn!(
                "Request {} {} retry {} in {:?} ({:?} cumulative): {error}",
                self.id,
                self.request.path,
                self.state.retry_count,
                delay,
                self.state.cumulative_backoff
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One pass through admission and transport
    async fn attempt(&self) -> Result<Outcome<T>> {
        let (tx, rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        let request = Arc::clone(&self.request);
        let cancel = self.cancel.clone();
        let id = self.id;

        self.scheduler.submit(async move {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                response = transport.invoke(&request) => response,
            };
            debug!("Request {id} answered: {:?}", response.as_ref().map(|r| r.status));
            let _ = tx.send(response);
        })?;

        let response = rx.await.map_err(|_| {
            if self.cancel.is_cancelled() {
                ApiError::Cancelled
            } else {
                ApiError::Shutdown
            }
        })?;

        Ok(match response {
            Ok(raw) => self.decoder.decode(&raw),
            Err(e) => Outcome::Terminal(e.into()),
        })
    }
}
