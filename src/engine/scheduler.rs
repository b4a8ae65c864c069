//! # Admission Scheduler Module
//!
//! Paces outbound requests to a global queries-per-second ceiling and a
//! minimum spacing between sends, independent of how many callers submit.
//!
//! A single coordinator task owns the admission record and is the only place
//! pacing decisions are made. Admitted work is spawned onto the runtime, so a
//! slow network call never holds up the pacing clock for queued requests.

use crate::engine::error::{ApiError, Result};
use log::{debug, info};
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Default ceiling on requests per second
pub const DEFAULT_QUERIES_PER_SECOND: u32 = 10;

const WINDOW: Duration = Duration::from_secs(1);

/// A unit of admitted work. It performs the network call and reports back
/// through whatever channel it captured.
pub type Work = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Pacing parameters
///
/// Only built through [`RateLimit::new`], so the rate is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    max_queries_per_second: u32,
    minimum_interval: Duration,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(DEFAULT_QUERIES_PER_SECOND)
    }
}

impl RateLimit {
    /// Rate limit with the derived spacing of `1000 / (2 * qps)` milliseconds
    pub fn new(max_queries_per_second: u32) -> Self {
        let qps = max_queries_per_second.max(1);
        Self {
            max_queries_per_second: qps,
            minimum_interval: Duration::from_millis(1000 / (2 * u64::from(qps))),
        }
    }

    pub fn with_minimum_interval(mut self, minimum_interval: Duration) -> Self {
        self.minimum_interval = minimum_interval;
        self
    }

    /// Most sends allowed in any trailing one-second window
    pub fn max_queries_per_second(&self) -> u32 {
        self.max_queries_per_second
    }

    /// Smallest gap between two consecutive sends
    pub fn minimum_interval(&self) -> Duration {
        self.minimum_interval
    }
}

/// What happens to queued work when the scheduler is shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Keep admitting everything already queued, still honouring the limits
    #[default]
    Drain,
    /// Drop queued work; its pending results resolve to `ApiError::Shutdown`
    Discard,
}

/// Counters exposed for diagnostics
#[derive(Debug, Default)]
pub struct SchedulerStats {
    admitted: AtomicU64,
    requeued: AtomicU64,
}

impl SchedulerStats {
    /// Work items released to the runtime
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    /// Times a work item was pushed back to the tail of the queue
    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }
}

/// Handle to a running admission scheduler
///
/// Cloning the handle is cheap; every clone feeds the same coordinator.
#[derive(Clone)]
pub struct AdmissionScheduler {
    shared: Arc<Shared>,
}

struct Shared {
    queue: mpsc::UnboundedSender<Work>,
    limits: watch::Sender<RateLimit>,
    shutdown: CancellationToken,
    stats: Arc<SchedulerStats>,
    runtime: Handle,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionScheduler {
    /// Spawn the coordinator on the current tokio runtime
    ///
    /// Fails with `ApiError::Config` when called outside a runtime.
    pub fn start(limits: RateLimit, policy: ShutdownPolicy) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ApiError::Config(format!("No tokio runtime available: {e}")))?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (limits_tx, limits_rx) = watch::channel(limits);
        let shutdown = CancellationToken::new();
        let stats = Arc::new(SchedulerStats::default());

        let coordinator = Coordinator {
            queue: queue_rx,
            backlog: VecDeque::new(),
            limits: limits_rx,
            record: AdmissionRecord::default(),
            shutdown: shutdown.clone(),
            policy,
            closed: false,
            stats: Arc::clone(&stats),
            runtime: runtime.clone(),
        };

        info!(
            "Starting admission scheduler: {} qps, {:?} minimum interval, {:?} on shutdown",
            limits.max_queries_per_second, limits.minimum_interval, policy
        );
        let handle = runtime.spawn(coordinator.run());

        Ok(Self {
            shared: Arc::new(Shared {
                queue: queue_tx,
                limits: limits_tx,
                shutdown,
                stats,
                runtime,
                coordinator: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Enqueue work for eventual release. Never blocks.
    pub fn submit<F>(&self, work: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shared.shutdown.is_cancelled() {
            return Err(ApiError::Shutdown);
        }
        self.shared
            .queue
            .send(Box::pin(work))
            .map_err(|_| ApiError::Shutdown)
    }

    /// Replace the pacing parameters for work admitted from now on
    pub fn configure(&self, limits: RateLimit) {
        debug!(
            "Reconfiguring admission: {} qps, {:?} minimum interval",
            limits.max_queries_per_second, limits.minimum_interval
        );
        self.shared.limits.send_replace(limits);
    }

    pub fn rate_limit(&self) -> RateLimit {
        *self.shared.limits.borrow()
    }

    /// Runtime the coordinator and admitted work run on
    pub(crate) fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.shared.stats
    }

    /// Stop accepting work; queued work is handled per the shutdown policy
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Shut down and wait for the coordinator to exit
    pub async fn shutdown_and_wait(&self) {
        self.shutdown();
        let handle = match self.shared.coordinator.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Send history inside the trailing window, owned by the coordinator
#[derive(Debug, Default)]
struct AdmissionRecord {
    window: VecDeque<Instant>,
    last_sent: Option<Instant>,
}

impl AdmissionRecord {
    /// Earliest instant the next send may happen given the spacing rule
    fn spacing_deadline(&self, minimum_interval: Duration) -> Option<Instant> {
        self.last_sent.map(|last| last + minimum_interval)
    }

    /// Forget sends that left the trailing window
    fn purge(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// `None` when a send is allowed now, otherwise when the oldest send expires
    fn window_deadline(&self, now: Instant, max_queries_per_second: u32) -> Option<Instant> {
        if self.window.len() < max_queries_per_second as usize {
            return None;
        }
        let expiry = self.window.front().map(|&oldest| oldest + WINDOW)?;
        if expiry <= now { None } else { Some(expiry) }
    }

    fn record(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.window.push_back(now);
    }
}

struct Coordinator {
    queue: mpsc::UnboundedReceiver<Work>,
    backlog: VecDeque<Work>,
    limits: watch::Receiver<RateLimit>,
    record: AdmissionRecord,
    shutdown: CancellationToken,
    policy: ShutdownPolicy,
    closed: bool,
    stats: Arc<SchedulerStats>,
    runtime: Handle,
}

impl Coordinator {
    async fn run(mut self) {
        while let Some(work) = self.next_work().await {
            self.admit(work).await;
        }
        info!(
            "Admission scheduler stopped after admitting {} requests",
            self.stats.admitted()
        );
    }

    /// Next item in FIFO order; requeued items sit ahead of the channel
    async fn next_work(&mut self) -> Option<Work> {
        loop {
            if let Some(work) = self.backlog.pop_front() {
                return Some(work);
            }

            let shutdown = self.shutdown.clone();
            let closed = self.closed;
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled(), if !closed => None,
                work = self.queue.recv() => Some(work),
            };

            match next {
                Some(work) => return work,
                None => self.close(),
            }
        }
    }

    async fn admit(&mut self, work: Work) {
        let limits = *self.limits.borrow();

        // A pause can end early on shutdown; Drain still owes the full spacing.
        while let Some(deadline) = self.record.spacing_deadline(limits.minimum_interval) {
            if deadline <= Instant::now() {
                break;
            }
            self.pause_until(deadline).await;
            if self.discarding() {
                return;
            }
        }

        let now = Instant::now();
        self.record.purge(now);

        match self
            .record
            .window_deadline(now, limits.max_queries_per_second)
        {
            None => {
                self.record.record(now);
                let admitted = self.stats.admitted.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Admitted request #{admitted} ({} in window)",
                    self.record.window.len()
                );
                self.runtime.spawn(work);
            }
            Some(expiry) => {
                // Push to the tail behind everything already submitted; FIFO
                // order is not preserved under sustained pressure.
                while let Ok(queued) = self.queue.try_recv() {
                    self.backlog.push_back(queued);
                }
                self.backlog.push_back(work);
                self.stats.requeued.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Rate window full, requeued; next slot in {:?}",
                    expiry.saturating_duration_since(now)
                );
                self.pause_until(expiry).await;
            }
        }
    }

    async fn pause_until(&mut self, deadline: Instant) {
        if self.closed {
            sleep_until(deadline).await;
            return;
        }
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = sleep_until(deadline) => {}
            _ = shutdown.cancelled() => self.close(),
        }
    }

    fn discarding(&self) -> bool {
        self.closed && self.policy == ShutdownPolicy::Discard
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.close();

        if self.policy == ShutdownPolicy::Discard {
            let mut dropped = self.backlog.len();
            self.backlog.clear();
            while self.queue.try_recv().is_ok() {
                dropped += 1;
            }
            info!("Admission scheduler shutting down, discarded {dropped} queued requests");
        } else {
            info!("Admission scheduler shutting down, draining queued requests");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::oneshot;

    fn recorder() -> Arc<StdMutex<Vec<Instant>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    fn stamp(log: &Arc<StdMutex<Vec<Instant>>>) -> impl Future<Output = ()> + Send + 'static {
        let log = Arc::clone(log);
        async move {
            log.lock().unwrap().push(Instant::now());
        }
    }

    #[test]
    fn test_default_rate_limit() {
        let limits = RateLimit::default();
        assert_eq!(limits.max_queries_per_second(), 10);
        assert_eq!(limits.minimum_interval(), Duration::from_millis(50));
        assert_eq!(RateLimit::new(2).minimum_interval(), Duration::from_millis(250));
        assert_eq!(RateLimit::new(0).max_queries_per_second(), 1);
    }

    #[test]
    fn test_record_window() {
        let start = Instant::now();
        let mut record = AdmissionRecord::default();
        record.record(start);
        record.record(start + Duration::from_millis(100));

        assert_eq!(
            record.window_deadline(start + Duration::from_millis(200), 2),
            Some(start + WINDOW)
        );
        assert_eq!(record.window_deadline(start, 3), None);

        record.purge(start + WINDOW);
        assert_eq!(record.window.len(), 1);
        assert_eq!(
            record.spacing_deadline(Duration::from_millis(50)),
            Some(start + Duration::from_millis(150))
        );
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = AdmissionScheduler::start(RateLimit::default(), ShutdownPolicy::Drain);
        assert!(matches!(result, Err(ApiError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_bound_under_burst() {
        let limits = RateLimit::new(3).with_minimum_interval(Duration::from_millis(100));
        let scheduler = AdmissionScheduler::start(limits, ShutdownPolicy::Drain).unwrap();
        let log = recorder();

        for _ in 0..10 {
            scheduler.submit(stamp(&log)).unwrap();
        }
        scheduler.shutdown_and_wait().await;
        tokio::task::yield_now().await;

        let sends = log.lock().unwrap().clone();
        assert_eq!(sends.len(), 10);
        for pair in sends.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(100));
        }
        for (i, &t) in sends.iter().enumerate() {
            let in_window = sends[i..]
                .iter()
                .take_while(|&&later| later.duration_since(t) < WINDOW)
                .count();
            assert!(in_window <= 3, "{in_window} sends within one second");
        }
        assert!(scheduler.stats().requeued() > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_waves_with_zero_interval() {
        let limits = RateLimit::new(2).with_minimum_interval(Duration::ZERO);
        let scheduler = AdmissionScheduler::start(limits, ShutdownPolicy::Drain).unwrap();
        let log = recorder();
        let start = Instant::now();

        for _ in 0..5 {
            scheduler.submit(stamp(&log)).unwrap();
        }
        scheduler.shutdown_and_wait().await;
        tokio::task::yield_now().await;

        let sends = log.lock().unwrap().clone();
        assert_eq!(sends.len(), 5);
        assert!(sends[1].duration_since(start) < Duration::from_millis(10));
        assert!(sends[2].duration_since(sends[1]) >= Duration::from_millis(500));
        assert!(sends[4].duration_since(start) >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_work_does_not_stall_admission() {
        let limits = RateLimit::new(100).with_minimum_interval(Duration::ZERO);
        let scheduler = AdmissionScheduler::start(limits, ShutdownPolicy::Drain).unwrap();
        let (tx, rx) = oneshot::channel();

        scheduler
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .unwrap();
        scheduler
            .submit(async move {
                let _ = tx.send(Instant::now());
            })
            .unwrap();

        let start = Instant::now();
        let admitted_at = rx.await.unwrap();
        assert!(admitted_at.duration_since(start) < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_applies_to_later_work() {
        let scheduler = AdmissionScheduler::start(
            RateLimit::new(1).with_minimum_interval(Duration::ZERO),
            ShutdownPolicy::Drain,
        )
        .unwrap();
        scheduler.configure(RateLimit::new(50).with_minimum_interval(Duration::ZERO));
        assert_eq!(scheduler.rate_limit().max_queries_per_second(), 50);

        let log = recorder();
        let start = Instant::now();
        for _ in 0..5 {
            scheduler.submit(stamp(&log)).unwrap();
        }
        scheduler.shutdown_and_wait().await;
        tokio::task::yield_now().await;

        let sends = log.lock().unwrap().clone();
        assert_eq!(sends.len(), 5);
        assert!(sends[4].duration_since(start) < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_keeps_spacing_when_shutdown_interrupts_pause() {
        let limits = RateLimit::new(100).with_minimum_interval(Duration::from_millis(500));
        let scheduler = AdmissionScheduler::start(limits, ShutdownPolicy::Drain).unwrap();
        let log = recorder();

        scheduler.submit(stamp(&log)).unwrap();
        scheduler.submit(stamp(&log)).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown_and_wait().await;
        tokio::task::yield_now().await;

        let sends = log.lock().unwrap().clone();
        assert_eq!(sends.len(), 2);
        let gap = sends[1].duration_since(sends[0]);
        assert!(gap >= Duration::from_millis(500), "sends only {gap:?} apart");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_is_clamped() {
        let scheduler =
            AdmissionScheduler::start(RateLimit::default(), ShutdownPolicy::Drain).unwrap();
        scheduler.configure(RateLimit::new(0));
        assert_eq!(scheduler.rate_limit().max_queries_per_second(), 1);
        assert_eq!(
            scheduler.rate_limit().minimum_interval(),
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_drops_queued_work() {
        let limits = RateLimit::new(1).with_minimum_interval(Duration::ZERO);
        let scheduler = AdmissionScheduler::start(limits, ShutdownPolicy::Discard).unwrap();
        let log = recorder();

        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel::<()>();
            let log = Arc::clone(&log);
            scheduler
                .submit(async move {
                    log.lock().unwrap().push(Instant::now());
                    let _ = tx.send(());
                })
                .unwrap();
            receivers.push(rx);
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown_and_wait().await;

        assert_eq!(log.lock().unwrap().len(), 1);
        let mut receivers = receivers.into_iter();
        assert!(receivers.next().unwrap().await.is_ok());
        for rx in receivers {
            assert!(rx.await.is_err(), "discarded work must drop its channel");
        }
        assert!(matches!(scheduler.submit(async {}), Err(ApiError::Shutdown)));
    }
}
