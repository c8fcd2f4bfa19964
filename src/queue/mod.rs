//! Job backend adapter: Redis-backed queue, task state model and the
//! worker loop that drains the queue.

pub mod backend;
pub mod task;
pub mod worker;

pub use backend::RedisBackend;
pub use task::{
    JobPayload, ProcessingResult, ProcessingStatus, TaskRecord, TaskState, WorkerInfo,
};

use std::path::Path;

use async_trait::async_trait;

use crate::types::AppResult;

/// Seam between the HTTP layer and the distributed queue. `RedisBackend`
/// is the production implementation; tests substitute an in-memory double.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a processing job for the stored input path, returning the
    /// task id. `AppError::BackendUnavailable` when the broker cannot be
    /// reached; that outcome triggers the synchronous fallback.
    async fn submit(&self, input_path: &Path) -> AppResult<String>;

    /// Returns the normalized state for a task id.
    async fn query_state(&self, task_id: &str) -> AppResult<TaskState>;

    /// Lists currently registered live workers. An empty set is a valid
    /// (if unhealthy) answer, not an error.
    async fn list_workers(&self) -> AppResult<Vec<WorkerInfo>>;

    /// Round-trips a probe value through the result store.
    async fn ping_roundtrip(&self) -> AppResult<()>;
}

/// Worker-side seam onto the queue and result store: blocking pops plus
/// record and heartbeat writes. Split from [`JobQueue`] so the worker
/// loop can be exercised against an in-memory double.
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    /// Blocks up to `timeout_secs` for the next job. `None` on timeout
    /// or when the popped payload is unreadable.
    async fn pop_job(&self, timeout_secs: u64) -> AppResult<Option<JobPayload>>;

    /// Writes a task state record.
    async fn store_record(&self, task_id: &str, record: &TaskRecord) -> AppResult<()>;

    /// Creates or refreshes a worker's registry entry.
    async fn register_worker(&self, info: &WorkerInfo) -> AppResult<()>;

    /// Removes a worker's registry entry on graceful shutdown.
    async fn deregister_worker(&self, worker_id: &str) -> AppResult<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::AppError;

    /// In-memory stand-in for the Redis backend with a fixed behavior.
    pub(crate) struct StaticQueue {
        pub available: bool,
        pub state: Option<TaskState>,
        pub workers: Vec<WorkerInfo>,
    }

    impl StaticQueue {
        pub fn up() -> Self {
            Self {
                available: true,
                state: None,
                workers: Vec::new(),
            }
        }

        pub fn down() -> Self {
            Self {
                available: false,
                state: None,
                workers: Vec::new(),
            }
        }

        fn unavailable() -> AppError {
            AppError::BackendUnavailable("connection refused".to_string())
        }
    }

    #[async_trait]
    impl JobQueue for StaticQueue {
        async fn submit(&self, _input_path: &Path) -> AppResult<String> {
            if self.available {
                Ok(uuid::Uuid::new_v4().to_string())
            } else {
                Err(Self::unavailable())
            }
        }

        async fn query_state(&self, _task_id: &str) -> AppResult<TaskState> {
            if self.available {
                Ok(self.state.clone().unwrap_or_else(TaskState::pending))
            } else {
                Err(Self::unavailable())
            }
        }

        async fn list_workers(&self) -> AppResult<Vec<WorkerInfo>> {
            if self.available {
                Ok(self.workers.clone())
            } else {
                Err(Self::unavailable())
            }
        }

        async fn ping_roundtrip(&self) -> AppResult<()> {
            if self.available {
                Ok(())
            } else {
                Err(Self::unavailable())
            }
        }
    }
}
