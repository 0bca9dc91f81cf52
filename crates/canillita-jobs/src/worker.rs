//! Worker pool driving jobs through the queue state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use canillita_core::{
    defaults, Error, ErrorKind, Job, JobKind, PlatformClient, ProcessedPostRecord, Result,
};
use canillita_db::Stores;

use crate::backoff::BackoffPolicy;
use crate::delivery::deliver;
use crate::handler::{JobContext, JobHandler};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Number of workers; each holds at most one job.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
    /// Upper bound on one job execution, delivery included.
    pub job_timeout: Duration,
    /// How long in-flight jobs may keep running after shutdown is requested.
    pub shutdown_grace: Duration,
    /// Timeout for each chunk submission.
    pub delivery_timeout: Duration,
    pub max_chunk_length: usize,
    pub backoff: BackoffPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS),
            delivery_timeout: Duration::from_secs(defaults::DELIVERY_TIMEOUT_SECS),
            max_chunk_length: defaults::MAX_CHUNK_LENGTH,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Worker pool size |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `300` | Per-job execution limit |
    /// | `JOB_SHUTDOWN_GRACE_SECS` | `10` | Grace period before leases are released |
    /// | `JOB_BACKOFF_BASE_SECS` | `60` | First retry delay |
    /// | `JOB_BACKOFF_MAX_SECS` | `3600` | Retry delay cap |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        let grace_secs = std::env::var("JOB_SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::SHUTDOWN_GRACE_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            job_timeout: Duration::from_secs(job_timeout_secs),
            shutdown_grace: Duration::from_secs(grace_secs),
            backoff: BackoffPolicy::from_env(),
            ..Self::default()
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the worker pool size.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_max_chunk_length(mut self, len: usize) -> Self {
        self.max_chunk_length = len;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Event emitted by the worker pool.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Pool started.
    WorkerStarted,
    /// Pool stopped; every worker has exited.
    WorkerStopped,
    /// One worker hit an invariant violation and exited.
    WorkerFailed { worker_id: usize, error: String },
    /// A job was leased and started.
    JobStarted {
        job_id: Uuid,
        kind: JobKind,
        worker_id: usize,
    },
    /// A job delivered every chunk and was recorded.
    JobCompleted {
        job_id: Uuid,
        kind: JobKind,
        message_ids: Vec<String>,
    },
    /// A job failed transiently and went back to pending.
    JobRetrying {
        job_id: Uuid,
        kind: JobKind,
        attempt: i32,
        next_eligible_at: DateTime<Utc>,
        error: String,
    },
    /// A job was moved to the dead-letter table.
    JobDeadLettered {
        job_id: Uuid,
        kind: JobKind,
        error_kind: ErrorKind,
        error: String,
    },
    /// A lease was handed back without consuming an attempt.
    JobReleased { job_id: Uuid, kind: JobKind },
}

/// How one execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Retried,
    DeadLettered,
    Released,
}

/// Tally of a [`JobWorker::run_once`] drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub released: usize,
}

impl DrainReport {
    fn add(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Retried => self.retried += 1,
            JobOutcome::DeadLettered => self.dead_lettered += 1,
            JobOutcome::Released => self.released += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.retried + self.dead_lettered + self.released
    }
}

/// Handle for controlling a running pool.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the pool to shut down gracefully.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// A receiver for the pool's shutdown signal, for tasks that should stop
    /// alongside it.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("worker pool task failed: {}", e)))
    }
}

/// Resolves once shutdown has been requested or the handle is gone.
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Pool of workers pulling jobs from the shared queue.
pub struct JobWorker {
    stores: Stores,
    platform: Arc<dyn PlatformClient>,
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new pool without handlers.
    pub fn new(stores: Stores, platform: Arc<dyn PlatformClient>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            stores,
            platform,
            handlers: HashMap::new(),
            config,
            event_tx,
        }
    }

    /// Register a handler for its job kind.
    pub fn register_handler(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.job_kind();
        self.handlers.insert(kind, handler);
        debug!(job_kind = %kind, "Registered job handler");
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.stores.jobs.pending_count().await
    }

    /// Start the pool and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();
        let worker = Arc::new(self);
        let task = tokio::spawn(async move {
            worker.run(shutdown_rx).await;
        });
        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Recover leases left behind by a crashed process.
    pub async fn release_stale_leases(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::seconds(defaults::STALE_LEASE_SECS);
        let released = self.stores.jobs.release_stale_leases(cutoff).await?;
        if released > 0 {
            warn!(released, "Released stale job leases");
        }
        Ok(released)
    }

    /// Process every currently eligible job one at a time, then return.
    pub async fn run_once(&self) -> Result<DrainReport> {
        let (_keep_open, mut shutdown) = watch::channel(false);
        let mut report = DrainReport::default();
        while let Some(job) = self.stores.jobs.claim_next(Utc::now()).await? {
            let job_id = job.id;
            match self.execute_job(0, job, &mut shutdown).await {
                Ok(outcome) => report.add(outcome),
                Err(e) => {
                    if e.kind() != ErrorKind::InvariantViolation {
                        self.recover_lease(job_id, &e).await;
                    }
                    return Err(e);
                }
            }
        }
        info!(
            completed = report.completed,
            retried = report.retried,
            dead_lettered = report.dead_lettered,
            "Queue drained"
        );
        Ok(report)
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        if let Err(e) = self.release_stale_leases().await {
            error!(error = %e, "Failed to release stale leases");
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            workers = self.config.max_concurrent_jobs,
            "Job worker pool started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.max_concurrent_jobs.max(1) {
            let worker = self.clone();
            let shutdown = shutdown_rx.clone();
            workers.spawn(async move { worker.worker_loop(worker_id, shutdown).await });
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = ?e, "Worker task panicked");
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker pool stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        debug!(worker_id, "Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Registered before claiming so an enqueue in between still wakes us.
            let notified = self.stores.notify.notified();

            let claimed = match self.stores.jobs.claim_next(Utc::now()).await {
                Ok(claimed) => claimed,
                Err(e) if e.kind() == ErrorKind::InvariantViolation => {
                    self.worker_failed(worker_id, &e);
                    break;
                }
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to claim job");
                    None
                }
            };

            match claimed {
                Some(job) => {
                    let job_id = job.id;
                    if let Err(e) = self.execute_job(worker_id, job, &mut shutdown).await {
                        if e.kind() == ErrorKind::InvariantViolation {
                            self.worker_failed(worker_id, &e);
                            break;
                        }
                        self.recover_lease(job_id, &e).await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = notified => {}
                        _ = sleep(poll_interval) => {}
                    }
                }
            }
        }
        debug!(worker_id, "Worker stopped");
    }

    /// Hand a job back after a store error left its transition unapplied.
    async fn recover_lease(&self, job_id: Uuid, e: &Error) {
        warn!(
            %job_id,
            error = %e,
            error_kind = %e.kind(),
            "Job transition failed, releasing lease"
        );
        if let Err(release_err) = self.stores.jobs.release(job_id).await {
            warn!(
                %job_id,
                error = %release_err,
                "Lease release failed, left for stale-lease recovery"
            );
        }
    }

    fn worker_failed(&self, worker_id: usize, e: &Error) {
        error!(worker_id, error = %e, "Worker stopping after invariant violation");
        let _ = self.event_tx.send(WorkerEvent::WorkerFailed {
            worker_id,
            error: e.to_string(),
        });
    }

    /// Execute one leased job and apply the resulting transition.
    ///
    /// Handler and delivery failures are absorbed into a retry or dead-letter
    /// transition. Errors returned are invariant violations or store errors
    /// raised while applying the transition itself.
    #[instrument(
        skip(self, job, shutdown),
        fields(subsystem = "jobs", job_id = %job.id, job_kind = %job.kind)
    )]
    async fn execute_job(
        &self,
        worker_id: usize,
        job: Job,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<JobOutcome> {
        let start = Instant::now();
        info!(
            external_id = %job.source.external_id,
            attempt = job.attempt + 1,
            "Processing job"
        );
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id: job.id,
            kind: job.kind,
            worker_id,
        });

        let grace = self.config.shutdown_grace;
        let result = tokio::select! {
            result = tokio::time::timeout(self.config.job_timeout, self.run_job(&job)) => {
                result.unwrap_or_else(|_| {
                    Err(Error::Timeout(format!(
                        "job exceeded timeout of {}s",
                        self.config.job_timeout.as_secs()
                    )))
                })
            }
            _ = async {
                shutdown_requested(shutdown).await;
                sleep(grace).await;
            } => {
                warn!(grace_secs = grace.as_secs(), "Shutdown grace elapsed, releasing lease");
                self.stores.jobs.release(job.id).await?;
                let _ = self.event_tx.send(WorkerEvent::JobReleased {
                    job_id: job.id,
                    kind: job.kind,
                });
                return Ok(JobOutcome::Released);
            }
        };

        match result {
            Ok(message_ids) => {
                let record =
                    ProcessedPostRecord::succeeded(job.source.clone(), message_ids.clone(), Utc::now());
                self.stores.jobs.complete(job.id, &record).await?;
                info!(
                    chunk_count = message_ids.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    kind: job.kind,
                    message_ids,
                });
                Ok(JobOutcome::Completed)
            }
            Err(e) => self.fail_job(&job, e, start).await,
        }
    }

    async fn run_job(&self, job: &Job) -> Result<Vec<String>> {
        let handler = self.handlers.get(&job.kind).cloned().ok_or_else(|| {
            Error::Permanent(format!("no handler registered for job kind {}", job.kind))
        })?;
        let ctx = JobContext::new(job.clone(), self.config.max_chunk_length);
        let chunks = handler.prepare(&ctx).await?;
        deliver(
            self.platform.as_ref(),
            self.stores.jobs.as_ref(),
            job,
            &chunks,
            self.config.delivery_timeout,
        )
        .await
    }

    async fn fail_job(&self, job: &Job, e: Error, start: Instant) -> Result<JobOutcome> {
        let kind = e.kind();
        let message = e.to_string();
        let duration_ms = start.elapsed().as_millis() as u64;

        if kind == ErrorKind::InvariantViolation {
            self.stores.jobs.release(job.id).await?;
            return Err(e);
        }

        let failures = job.attempt + 1;
        if kind.is_retryable() && failures < job.max_attempts {
            let next_eligible_at = self.config.backoff.next_eligible_at(Utc::now(), failures);
            self.stores
                .jobs
                .retry(job.id, &message, next_eligible_at)
                .await?;
            warn!(
                error_kind = %kind,
                error = %message,
                attempt = failures,
                next_eligible_at = %next_eligible_at,
                duration_ms,
                "Job failed, will retry"
            );
            let _ = self.event_tx.send(WorkerEvent::JobRetrying {
                job_id: job.id,
                kind: job.kind,
                attempt: failures,
                next_eligible_at,
                error: message,
            });
            Ok(JobOutcome::Retried)
        } else {
            self.stores
                .jobs
                .dead_letter(job.id, kind, &message, Utc::now())
                .await?;
            warn!(
                error_kind = %kind,
                error = %message,
                attempt = failures,
                duration_ms,
                "Job dead-lettered"
            );
            let _ = self.event_tx.send(WorkerEvent::JobDeadLettered {
                job_id: job.id,
                kind: job.kind,
                error_kind: kind,
                error: message,
            });
            Ok(JobOutcome::DeadLettered)
        }
    }
}

/// Builder for creating a worker pool with handlers.
pub struct WorkerBuilder {
    stores: Stores,
    platform: Arc<dyn PlatformClient>,
    config: WorkerConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl WorkerBuilder {
    /// Create a new worker builder.
    pub fn new(stores: Stores, platform: Arc<dyn PlatformClient>) -> Self {
        Self {
            stores,
            platform,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the worker configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a job handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Build the pool.
    pub fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.stores, self.platform, self.config);
        for handler in self.handlers {
            worker.register_handler(handler);
        }
        worker
    }
}
