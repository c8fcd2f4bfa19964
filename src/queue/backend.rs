//! Redis implementation of the job backend.
//!
//! Connections are dialed per call rather than pooled so that a dead
//! broker is detected at the moment of use and reported as
//! `BackendUnavailable`, the signal the dispatcher degrades on.

use std::path::Path;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::queue::task::{JobPayload, TaskRecord, TaskState, WorkerInfo};
use crate::queue::{JobQueue, WorkerQueue};
use crate::types::{AppError, AppResult};

/// Heartbeat records expire after this many seconds; a worker that
/// misses three beats in a row disappears from the registry.
pub const WORKER_TTL_SECS: u64 = 15;
const PROBE_TTL_SECS: u64 = 10;

pub struct RedisBackend {
    client: redis::Client,
    cfg: RedisConfig,
}

impl RedisBackend {
    pub fn new(cfg: RedisConfig) -> AppResult<Self> {
        let client = redis::Client::open(cfg.url.as_str())
            .map_err(|e| AppError::Internal(format!("invalid redis url {}: {e}", cfg.url)))?;
        Ok(Self { client, cfg })
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_err)
    }

    fn task_key(&self, task_id: &str) -> String {
        format!("{}{}", self.cfg.task_key_prefix, task_id)
    }

    fn worker_key(&self, worker_id: &str) -> String {
        format!("{}{}", self.cfg.worker_key_prefix, worker_id)
    }
}

#[async_trait]
impl WorkerQueue for RedisBackend {
    /// Blocks up to `timeout_secs` for the next job. `None` on timeout or
    /// when the popped payload is unreadable (logged and skipped so one
    /// poison entry cannot wedge the worker).
    async fn pop_job(&self, timeout_secs: u64) -> AppResult<Option<JobPayload>> {
        let mut con = self.connection().await?;
        let popped: Option<(String, String)> = con
            .brpop(&self.cfg.queue_key, timeout_secs as f64)
            .await
            .map_err(backend_err)?;
        let Some((_, raw)) = popped else {
            return Ok(None);
        };
        match serde_json::from_str::<JobPayload>(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                warn!(error = %e, "dropping unreadable job payload");
                Ok(None)
            }
        }
    }

    /// Writes a task state record with the configured TTL.
    async fn store_record(&self, task_id: &str, record: &TaskRecord) -> AppResult<()> {
        let body = serde_json::to_string(record)
            .map_err(|e| AppError::Internal(format!("failed to encode task record: {e}")))?;
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(self.task_key(task_id), body, self.cfg.task_ttl_secs)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn register_worker(&self, info: &WorkerInfo) -> AppResult<()> {
        let body = serde_json::to_string(info)
            .map_err(|e| AppError::Internal(format!("failed to encode worker info: {e}")))?;
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(self.worker_key(&info.id), body, WORKER_TTL_SECS)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn deregister_worker(&self, worker_id: &str) -> AppResult<()> {
        let mut con = self.connection().await?;
        let _: () = con
            .del(self.worker_key(worker_id))
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisBackend {
    async fn submit(&self, input_path: &Path) -> AppResult<String> {
        let job = JobPayload::new(input_path.to_string_lossy().into_owned());
        let body = serde_json::to_string(&job)
            .map_err(|e| AppError::Internal(format!("failed to encode job: {e}")))?;

        let mut con = self.connection().await?;
        let _: () = con
            .lpush(&self.cfg.queue_key, body)
            .await
            .map_err(backend_err)?;

        debug!(task_id = %job.id, input = %job.input_path, "job enqueued");
        Ok(job.id)
    }

    async fn query_state(&self, task_id: &str) -> AppResult<TaskState> {
        let mut con = self.connection().await?;
        let raw: Option<String> = con.get(self.task_key(task_id)).await.map_err(backend_err)?;

        let record = match raw {
            None => None,
            Some(raw) => match serde_json::from_str::<TaskRecord>(&raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    // A corrupt record is folded into FAILURE like any
                    // other unrecognized state.
                    warn!(task_id, error = %e, "unreadable task record");
                    Some(TaskRecord {
                        state: "UNREADABLE".to_string(),
                        error: Some(format!("unreadable task record: {e}")),
                        ..Default::default()
                    })
                }
            },
        };

        Ok(TaskState::from_record(record))
    }

    async fn list_workers(&self) -> AppResult<Vec<WorkerInfo>> {
        let mut con = self.connection().await?;
        let pattern = format!("{}*", self.cfg.worker_key_prefix);

        let keys: Vec<String> = {
            let mut iter = con
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(backend_err)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut workers = Vec::new();
        for key in keys {
            let raw: Option<String> = con.get(&key).await.map_err(backend_err)?;
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<WorkerInfo>(&raw) {
                Ok(info) => workers.push(info),
                Err(e) => warn!(key, error = %e, "skipping unreadable worker record"),
            }
        }

        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workers)
    }

    async fn ping_roundtrip(&self) -> AppResult<()> {
        let key = format!("contour:health:{}", Uuid::new_v4().simple());
        let mut con = self.connection().await?;

        let _: () = con
            .set_ex(&key, "ok", PROBE_TTL_SECS)
            .await
            .map_err(backend_err)?;
        let value: Option<String> = con.get(&key).await.map_err(backend_err)?;
        let _: () = con.del(&key).await.map_err(backend_err)?;

        if value.as_deref() == Some("ok") {
            Ok(())
        } else {
            Err(AppError::BackendUnavailable(
                "result store probe value mismatch".to_string(),
            ))
        }
    }
}

/// Maps a redis error onto the taxonomy. Anything that looks like the
/// broker being unreachable becomes `BackendUnavailable`; genuine
/// protocol or type errors stay internal.
fn backend_err(e: RedisError) -> AppError {
    if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() || e.is_connection_dropped() {
        AppError::BackendUnavailable(e.to_string())
    } else {
        AppError::Internal(format!("redis error: {e}"))
    }
}
