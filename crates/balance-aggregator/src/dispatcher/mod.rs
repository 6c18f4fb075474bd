//! # Batch Dispatcher
//!
//! One dispatcher runs per provider. Callers submit single-address
//! requests; the dispatcher loop queues them and hands a prefix of the
//! queue to the provider once the batch is full or its flush deadline has
//! passed. The provider's answer is reconciled against what was asked, so
//! every request receives exactly one result.
//!
//! ## Flush policy
//! - Size: the queue holds `min(batch_limit, remaining quota)` requests.
//! - Time: `flush_interval` has elapsed since the first request entered an
//!   empty queue.
//! - No flush happens while the rate window is exhausted. Requests keep
//!   queueing and the loop sleeps until the window resets.
//!
//! ## Failures
//! A failed provider call hands each request back to the dispatcher's own
//! intake after a backoff delay. A request that has failed
//! `retry.max_attempts` times is answered with a failure result instead.
//! A "rate limited" answer exhausts the window and requeues the batch
//! without counting an attempt.

mod batch;
mod clock;
mod rate_window;
mod retry;

pub use batch::{Batch, BalanceRequest, Reconciliation};
pub use clock::{AnchoredClock, Clock, SystemClock};
pub use rate_window::RateWindow;
pub use retry::RetryPolicy;

use crate::providers::BalanceProvider;
use metrics::{counter, histogram};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

/// Quota of addresses per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub quota: u32,
    pub period: Duration,
}

/// Per-provider dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Most addresses sent in one provider call
    pub batch_limit: usize,
    /// Longest the first queued request waits for its batch to fill
    pub flush_interval: Duration,
    pub rate_limit: Option<RateLimit>,
    pub retry: RetryPolicy,
    /// Bound on submitted requests not yet taken by the loop
    pub intake_capacity: usize,
    /// Provider calls allowed in flight at once
    pub max_concurrent_batches: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_limit: 25,
            flush_interval: Duration::from_secs(5),
            rate_limit: None,
            retry: RetryPolicy::default(),
            intake_capacity: 1024,
            max_concurrent_batches: 4,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Dispatcher {provider} has stopped")]
    Stopped { provider: String },
}

impl common::ServiceError for DispatchError {}

/// Builder for a dispatcher loop
pub struct BatchDispatcher {
    provider: Arc<dyn BalanceProvider>,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
}

impl BatchDispatcher {
    pub fn new(provider: Arc<dyn BalanceProvider>, config: DispatcherConfig) -> Self {
        Self {
            provider,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for rate window boundaries
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Spawn the dispatcher loop
    ///
    /// The loop runs until every handle has been dropped.
    pub fn start(self) -> DispatcherHandle {
        let name: Arc<str> = Arc::from(self.provider.name());
        let (intake_tx, intake_rx) = mpsc::channel(self.config.intake_capacity.max(1));
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();

        let window = self
            .config
            .rate_limit
            .map(|limit| RateWindow::new(limit.quota, limit.period, self.clock.now()));
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_batches.max(1)));

        let dispatch_loop = DispatchLoop {
            name: name.clone(),
            provider: self.provider,
            clock: self.clock,
            intake: intake_rx,
            resubmit: intake_tx.downgrade(),
            feedback_tx,
            feedback_rx,
            pending: VecDeque::new(),
            flush_deadline: None,
            flush_overdue: false,
            window,
            permits,
            config: self.config,
        };

        info!(
            provider = %name,
            batch_limit = dispatch_loop.config.batch_limit,
            "Starting dispatcher"
        );
        tokio::spawn(dispatch_loop.run());

        DispatcherHandle {
            name,
            intake: intake_tx,
        }
    }
}

/// Cloneable submission handle for one dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    name: Arc<str>,
    intake: mpsc::Sender<BalanceRequest>,
}

impl DispatcherHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a request; waits while the intake is full
    pub async fn submit(&self, request: BalanceRequest) -> Result<(), DispatchError> {
        self.intake
            .send(request)
            .await
            .map_err(|_| DispatchError::Stopped {
                provider: self.name.to_string(),
            })
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("name", &self.name)
            .finish()
    }
}

enum Feedback {
    /// The provider refused the batch because of its quota
    RateLimited(Vec<BalanceRequest>),
}

struct DispatchLoop {
    name: Arc<str>,
    provider: Arc<dyn BalanceProvider>,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    intake: mpsc::Receiver<BalanceRequest>,
    resubmit: mpsc::WeakSender<BalanceRequest>,
    feedback_tx: mpsc::UnboundedSender<Feedback>,
    feedback_rx: mpsc::UnboundedReceiver<Feedback>,
    pending: VecDeque<BalanceRequest>,
    flush_deadline: Option<Instant>,
    /// The deadline passed while the window was exhausted
    flush_overdue: bool,
    window: Option<RateWindow>,
    permits: Arc<Semaphore>,
}

impl DispatchLoop {
    async fn run(mut self) {
        loop {
            self.flush_ready();

            let flush_at = self.flush_deadline;
            let reset_at = self.reset_deadline();

            tokio::select! {
                request = self.intake.recv() => match request {
                    Some(request) => self.enqueue(request),
                    None => break,
                },
                Some(feedback) = self.feedback_rx.recv() => self.on_feedback(feedback),
                _ = sleep_until_some(flush_at) => self.on_flush_deadline(),
                _ = sleep_until_some(reset_at) => {
                    debug!(provider = %self.name, "Rate window reset");
                }
            }
        }

        self.drain();
        info!(provider = %self.name, "Dispatcher stopped");
    }

    fn enqueue(&mut self, request: BalanceRequest) {
        if request.is_abandoned() {
            debug!(provider = %self.name, address = %request.address, "Skipping abandoned request");
            return;
        }
        if self.pending.is_empty() && self.flush_deadline.is_none() {
            self.flush_deadline = Some(Instant::now() + self.config.flush_interval);
        }
        self.pending.push_back(request);
    }

    fn on_flush_deadline(&mut self) {
        self.flush_deadline = None;
        if self.pending.is_empty() {
            return;
        }

        if self.effective_batch_size() == 0 {
            debug!(
                provider = %self.name,
                queued = self.pending.len(),
                "Flush deadline passed with the rate window exhausted"
            );
            self.flush_overdue = true;
            return;
        }

        self.flush_partial();
    }

    fn on_feedback(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::RateLimited(requests) => {
                let now = self.clock.now();
                if let Some(window) = self.window.as_mut() {
                    window.exhaust(now);
                    warn!(
                        provider = %self.name,
                        requeued = requests.len(),
                        resets_at = %window.next_reset(),
                        "Provider reported rate limiting, holding requests until the window resets"
                    );
                }
                for request in requests.into_iter().rev() {
                    self.pending.push_front(request);
                }
                self.flush_overdue = true;
            }
        }
    }

    /// Flush every full batch, plus an overdue partial one once the window allows
    fn flush_ready(&mut self) {
        loop {
            let size = self.effective_batch_size();
            if size == 0 || self.pending.is_empty() {
                break;
            }
            if self.pending.len() >= size {
                self.flush(size);
            } else if self.flush_overdue {
                self.flush_partial();
            } else {
                break;
            }
        }

        if self.pending.is_empty() {
            self.flush_deadline = None;
            self.flush_overdue = false;
        } else if self.flush_deadline.is_none() && !self.flush_overdue {
            self.flush_deadline = Some(Instant::now() + self.config.flush_interval);
        }
    }

    fn flush_partial(&mut self) {
        let size = self.effective_batch_size().min(self.pending.len());
        self.flush_overdue = false;
        if size > 0 {
            self.flush(size);
        }
    }

    fn effective_batch_size(&mut self) -> usize {
        let now = self.clock.now();
        let remaining = self
            .window
            .as_mut()
            .map_or(usize::MAX, |window| window.remaining(now) as usize);
        self.config.batch_limit.min(remaining)
    }

    /// When to wake for the window reset, if queued requests are waiting on it
    fn reset_deadline(&mut self) -> Option<Instant> {
        if self.pending.is_empty() {
            return None;
        }
        let now = self.clock.now();
        let window = self.window.as_mut()?;
        if window.remaining(now) > 0 {
            return None;
        }
        Some(Instant::now() + window.until_reset(now))
    }

    /// Drain a prefix of up to `size` requests into one provider call
    fn flush(&mut self, size: usize) {
        let mut requests = Vec::with_capacity(size);
        while requests.len() < size {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            if request.is_abandoned() {
                continue;
            }
            requests.push(request);
        }
        // The rest of the queue starts a new batch
        self.flush_deadline = None;
        if requests.is_empty() {
            return;
        }

        let batch = Batch::new(self.name.to_string(), requests);
        let addresses = batch.addresses().len();
        if let Some(window) = self.window.as_mut() {
            window.record(self.clock.now(), addresses as u32);
        }

        debug!(
            provider = %self.name,
            batch_size = addresses,
            queued = self.pending.len(),
            "Flushing batch"
        );
        counter!("dispatcher_flushes_total", "provider" => self.name.to_string()).increment(1);
        histogram!("dispatcher_batch_size", "provider" => self.name.to_string())
            .record(addresses as f64);

        let job = BatchJob {
            name: self.name.clone(),
            provider: self.provider.clone(),
            retry: self.config.retry.clone(),
            resubmit: self.resubmit.clone(),
            feedback: self.window.is_some().then(|| self.feedback_tx.clone()),
        };
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                batch.fail_all("dispatcher stopped");
                return;
            };
            job.run(batch).await;
        });
    }

    /// Send what is left once no more requests can arrive
    fn drain(&mut self) {
        while !self.pending.is_empty() {
            let size = self.effective_batch_size();
            if size == 0 {
                let reason = "dispatcher stopped while the rate window was exhausted";
                for request in self.pending.drain(..) {
                    request.fail(&self.name, reason);
                }
                break;
            }
            self.flush(size);
        }
    }
}

/// One provider call and its follow-up
struct BatchJob {
    name: Arc<str>,
    provider: Arc<dyn BalanceProvider>,
    retry: RetryPolicy,
    resubmit: mpsc::WeakSender<BalanceRequest>,
    /// Present when the dispatcher tracks a rate window
    feedback: Option<mpsc::UnboundedSender<Feedback>>,
}

impl BatchJob {
    async fn run(self, mut batch: Batch) {
        match self.provider.fetch_balances(batch.addresses()).await {
            Ok(records) => {
                let outcome = batch.deliver(&records);
                if outcome.synthetic > 0 {
                    counter!("dispatcher_synthetic_results_total", "provider" => self.name.to_string())
                        .increment(outcome.synthetic as u64);
                }
                debug!(
                    provider = %self.name,
                    delivered = outcome.delivered,
                    synthetic = outcome.synthetic,
                    "Batch reconciled"
                );
            }
            Err(e) if e.is_rate_limited() && self.feedback.is_some() => {
                let requests = batch.into_unanswered();
                if let Some(feedback) = &self.feedback {
                    if let Err(mpsc::error::SendError(Feedback::RateLimited(requests))) =
                        feedback.send(Feedback::RateLimited(requests))
                    {
                        for request in requests {
                            request.fail(&self.name, "dispatcher stopped");
                        }
                    }
                }
            }
            Err(e) => {
                counter!("dispatcher_provider_failures_total", "provider" => self.name.to_string())
                    .increment(1);
                warn!(
                    provider = %self.name,
                    batch_size = batch.len(),
                    error = %e,
                    "Provider call failed"
                );
                self.schedule_retries(batch.into_unanswered(), &e.to_string());
            }
        }
    }

    fn schedule_retries(&self, requests: Vec<BalanceRequest>, reason: &str) {
        let mut waves: BTreeMap<u32, Vec<BalanceRequest>> = BTreeMap::new();

        for mut request in requests {
            let attempts = request.record_failure();
            if self.retry.should_retry(attempts) {
                waves.entry(attempts).or_default().push(request);
            } else {
                warn!(
                    provider = %self.name,
                    address = %request.address,
                    attempts,
                    "Giving up on request"
                );
                request.fail(
                    &self.name,
                    format!("gave up after {attempts} attempts: {reason}"),
                );
            }
        }

        for (attempts, requests) in waves {
            let delay = self.retry.delay_for(attempts);
            debug!(
                provider = %self.name,
                count = requests.len(),
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Resubmitting requests after backoff"
            );
            tokio::spawn(resubmit_after(
                delay,
                requests,
                self.resubmit.clone(),
                self.name.clone(),
            ));
        }
    }
}

async fn resubmit_after(
    delay: Duration,
    requests: Vec<BalanceRequest>,
    intake: mpsc::WeakSender<BalanceRequest>,
    name: Arc<str>,
) {
    sleep(delay).await;

    let Some(intake) = intake.upgrade() else {
        for request in requests {
            request.fail(&name, "dispatcher stopped before the request could be retried");
        }
        return;
    };

    for request in requests {
        if let Err(mpsc::error::SendError(request)) = intake.send(request).await {
            request.fail(&name, "dispatcher stopped before the request could be retried");
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
