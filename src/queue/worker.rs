//! Background worker: drains the job queue and records task states.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::queue::task::{JobPayload, ProcessingResult, TaskRecord, WorkerInfo};
use crate::queue::WorkerQueue;
use crate::types::{AppError, AppResult};
use crate::vision;

const HEARTBEAT_INTERVAL_SECS: u64 = 5;
/// Pause after a broker error before the next poll attempt.
const ERROR_BACKOFF_SECS: u64 = 2;

pub struct Worker {
    backend: Arc<dyn WorkerQueue>,
    result_dir: PathBuf,
    id: String,
    hostname: String,
    started_at: DateTime<Utc>,
    processed: AtomicU64,
    shutdown: AtomicBool,
}

impl Worker {
    pub fn new(backend: Arc<dyn WorkerQueue>, result_dir: PathBuf) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let id = format!("{}-{}", hostname, &Uuid::new_v4().simple().to_string()[..8]);
        Self {
            backend,
            result_dir,
            id,
            hostname,
            started_at: Utc::now(),
            processed: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Asks the poll loop to stop after the current iteration.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id.clone(),
            hostname: self.hostname.clone(),
            started_at: self.started_at,
            processed: self.processed.load(Ordering::Relaxed),
            last_seen: Utc::now(),
        }
    }

    /// Runs until shutdown is requested (ctrl-c or
    /// [`Worker::request_shutdown`]): polls the queue, processes jobs,
    /// keeps the heartbeat registry entry fresh.
    pub async fn run(self: Arc<Self>, poll_timeout_secs: u64) -> anyhow::Result<()> {
        self.backend.register_worker(&self.info()).await?;
        info!(worker_id = %self.id, "worker registered");

        let heartbeat = {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                let mut tick =
                    tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
                loop {
                    tick.tick().await;
                    if let Err(e) = worker.backend.register_worker(&worker.info()).await {
                        warn!(error = %e, "heartbeat failed");
                    }
                }
            })
        };

        {
            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!(worker_id = %worker.id, "shutdown signal received");
                    worker.request_shutdown();
                }
            });
        }

        // BRPOP removes the job from the queue the moment the broker
        // answers, so the pop future must never be cancelled mid-flight.
        // The shutdown flag is only checked between completed polls; a
        // job handed out by the final poll is still processed.
        while !self.shutdown_requested() {
            match self.backend.pop_job(poll_timeout_secs).await {
                Ok(Some(job)) => self.handle_job(job).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "queue poll failed, backing off");
                    sleep(Duration::from_secs(ERROR_BACKOFF_SECS)).await;
                }
            }
        }

        heartbeat.abort();
        if let Err(e) = self.backend.deregister_worker(&self.id).await {
            warn!(error = %e, "failed to deregister worker");
        }
        Ok(())
    }

    async fn handle_job(&self, job: JobPayload) {
        info!(task_id = %job.id, input = %job.input_path, "processing job");

        let progress = TaskRecord::progress(0, 1, "Detecting contours");
        if let Err(e) = self.backend.store_record(&job.id, &progress).await {
            warn!(task_id = %job.id, error = %e, "failed to record progress");
        }

        let input = PathBuf::from(&job.input_path);
        let result_dir = self.result_dir.clone();
        let outcome =
            tokio::task::spawn_blocking(move || vision::detect_and_draw_contours(&input, &result_dir))
                .await
                .map_err(|e| AppError::Internal(format!("processing task panicked: {e}")))
                .and_then(|r| r);
        let record = outcome_record(&job.input_path, outcome);

        if let Err(e) = self.backend.store_record(&job.id, &record).await {
            error!(task_id = %job.id, error = %e, "failed to record task outcome");
        } else {
            info!(task_id = %job.id, state = %record.state, "job finished");
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Maps a processing outcome onto the record written for the task: a
/// SUCCESS record carrying the result payload, or a FAILURE record
/// carrying the error message.
fn outcome_record(input_path: &str, outcome: AppResult<PathBuf>) -> TaskRecord {
    match outcome {
        Ok(output) => TaskRecord::success(ProcessingResult::completed(
            input_path.to_string(),
            output.to_string_lossy().into_owned(),
        )),
        Err(e) => TaskRecord::failure(e.to_string()),
    }
}
