//! # Pending Result Module
//!
//! The handle a caller gets back from `submit`. The retry engine resolves one
//! single-slot cell exactly once; every way of consuming the outcome is an
//! adapter over that cell.

use crate::engine::error::{ApiError, Result};
use log::debug;
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Eventual outcome of one logical request
///
/// Exactly one of [`await_result`](Self::await_result),
/// [`wait`](Self::wait), [`await_ignore_error`](Self::await_ignore_error) or
/// [`set_callback`](Self::set_callback) may be used, once. Any further call
/// fails with [`ApiError::AlreadyConsumed`]. [`cancel`](Self::cancel) can be
/// called at any time.
pub struct PendingResult<T> {
    cell: Mutex<Option<oneshot::Receiver<Result<T>>>>,
    cancel: CancellationToken,
    runtime: Handle,
}

/// Cancels a request without holding its [`PendingResult`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> PendingResult<T> {
    pub(crate) fn new(
        cell: oneshot::Receiver<Result<T>>,
        cancel: CancellationToken,
        runtime: Handle,
    ) -> Self {
        Self {
            cell: Mutex::new(Some(cell)),
            cancel,
            runtime,
        }
    }

    /// Already-settled result, used when a request fails before it starts
    pub(crate) fn settled(outcome: Result<T>, runtime: Handle) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self::new(rx, CancellationToken::new(), runtime)
    }

    /// Block the calling thread until the request reaches a terminal state
    ///
    /// # Panics
    ///
    /// Panics when called from inside an asynchronous execution context; use
    /// [`wait`](Self::wait) there.
    pub fn await_result(&self) -> Result<T> {
        let cell = self.take()?;
        settle(cell.blocking_recv())
    }

    /// Asynchronous counterpart of [`await_result`](Self::await_result)
    pub async fn wait(&self) -> Result<T> {
        let cell = self.take()?;
        settle(cell.await)
    }

    /// Block for the outcome and drop any failure
    ///
    /// The only error still returned is [`ApiError::AlreadyConsumed`], since
    /// that is a misuse rather than an outcome.
    pub fn await_ignore_error(&self) -> Result<Option<T>> {
        let cell = self.take()?;
        match settle(cell.blocking_recv()) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!("Ignoring request failure: {e}");
                Ok(None)
            }
        }
    }

    /// Register handlers invoked once the request settles
    ///
    /// Handlers run on the runtime that executes the request, not on the
    /// registering thread.
    pub fn set_callback<S, F>(&self, on_result: S, on_failure: F) -> Result<()>
    where
        S: FnOnce(T) + Send + 'static,
        F: FnOnce(ApiError) + Send + 'static,
    {
        let cell = self.take()?;
        self.runtime.spawn(async move {
            match settle(cell.await) {
                Ok(value) => on_result(value),
                Err(e) => on_failure(e),
            }
        });
        Ok(())
    }

    /// Best-effort cancellation; a no-op once the result has settled
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    fn take(&self) -> Result<oneshot::Receiver<Result<T>>> {
        let mut guard = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take().ok_or(ApiError::AlreadyConsumed)
    }
}

/// A dropped sender means the work never ran to completion: the scheduler
/// discarded it or the runtime went away.
fn settle<T>(received: std::result::Result<Result<T>, oneshot::error::RecvError>) -> Result<T> {
    received.unwrap_or(Err(ApiError::Shutdown))
}
