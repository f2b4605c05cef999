//! Job worker loop: claims queued ingestion jobs and drives the handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use paperdex_core::{
    defaults, Error, IngestQueue, IngestionJob, PaperRepository, ProcessingState, Result,
};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Per-job execution ceiling in seconds.
    pub job_timeout_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `600` | Per-job execution ceiling |
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
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout_secs,
            enabled,
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Set the per-job timeout.
    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was claimed and started.
    JobStarted { job_id: Uuid, paper_id: String },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, paper_id: String },
    /// A job failed.
    JobFailed {
        job_id: Uuid,
        paper_id: String,
        error: String,
    },
    /// Worker started.
    WorkerStarted,
    /// Worker stopped.
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes ingestion jobs from the queue.
pub struct JobWorker {
    queue: Arc<dyn IngestQueue>,
    papers: Arc<dyn PaperRepository>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// Create a new job worker.
    pub fn new(
        queue: Arc<dyn IngestQueue>,
        papers: Arc<dyn PaperRepository>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_CAPACITY);
        Self {
            queue,
            papers,
            handler,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time and processes them
    /// concurrently. Only sleeps when the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            job_timeout_secs = self.config.job_timeout_secs,
            "Job worker started"
        );

        // Jobs still marked running from a previous process are orphans by
        // now; recover them before claiming new work.
        self.reap_orphans().await;

        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_concurrent = self.config.max_concurrent_jobs;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..max_concurrent {
                match self.claim_job().await {
                    Some(job) => {
                        claimed += 1;
                        let runner = self.runner();
                        tasks.spawn(async move {
                            runner.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                // Queue empty, sleep before polling again
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
                // No sleep: immediately try to claim more jobs
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Fail running jobs older than the job timeout and flip their papers
    /// out of `processing`.
    async fn reap_orphans(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.job_timeout_secs as i64);
        match self.queue.reap_stale(cutoff).await {
            Ok(0) => {}
            Ok(reaped) => warn!(reaped, "Recovered orphaned jobs from previous run"),
            Err(e) => error!(error = ?e, "Failed to reap orphaned jobs"),
        }
    }

    /// Claim the next available job without processing it.
    async fn claim_job(&self) -> Option<IngestionJob> {
        match self.queue.claim_next().await {
            Ok(Some(job)) => Some(job),
            Ok(None) => None,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    /// Clone references needed for spawned job tasks.
    fn runner(&self) -> JobRunner {
        JobRunner {
            queue: self.queue.clone(),
            papers: self.papers.clone(),
            handler: self.handler.clone(),
            job_timeout_secs: self.config.job_timeout_secs,
            event_tx: self.event_tx.clone(),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pending job count.
    pub async fn pending_count(&self) -> Result<i64> {
        self.queue.pending_count().await
    }
}

/// Reference bundle for executing a single job in a spawned task.
struct JobRunner {
    queue: Arc<dyn IngestQueue>,
    papers: Arc<dyn PaperRepository>,
    handler: Arc<dyn JobHandler>,
    job_timeout_secs: u64,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobRunner {
    /// Execute a single claimed job.
    async fn execute_job(self, job: IngestionJob) {
        let start = Instant::now();
        let job_id = job.id;
        let paper_id = job.paper_id.clone();

        info!(%job_id, paper_id = %paper_id, "Processing job");

        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id,
            paper_id: paper_id.clone(),
        });

        let job_timeout = Duration::from_secs(self.job_timeout_secs);
        let result = match tokio::time::timeout(
            job_timeout,
            self.handler.execute(JobContext::new(job)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    %job_id,
                    paper_id = %paper_id,
                    "Job exceeded timeout of {}s",
                    self.job_timeout_secs
                );
                // Dropping the handler future skips its failure cleanup, so
                // the paper would stay in `processing` with no live job.
                // set_state never regresses a `completed` row.
                if let Err(e) = self
                    .papers
                    .set_state(&paper_id, ProcessingState::Failed)
                    .await
                {
                    error!(error = ?e, paper_id = %paper_id, "Failed to fail paper after job timeout");
                }
                JobResult::Failed(format!(
                    "Job exceeded timeout of {}s",
                    self.job_timeout_secs
                ))
            }
        };

        match result {
            JobResult::Success => {
                if let Err(e) = self.queue.complete(job_id).await {
                    error!(error = ?e, %job_id, "Failed to mark job as completed");
                } else {
                    info!(
                        %job_id,
                        paper_id = %paper_id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed successfully"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                        job_id,
                        paper_id,
                    });
                }
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.queue.fail(job_id, &error).await {
                    error!(error = ?e, %job_id, "Failed to mark job as failed");
                } else {
                    warn!(
                        %job_id,
                        paper_id = %paper_id,
                        %error,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id,
                        paper_id,
                        error,
                    });
                }
            }
        }
    }
}
