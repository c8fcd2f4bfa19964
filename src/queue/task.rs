//! Task state model.
//!
//! Workers write raw `TaskRecord`s into the result store; the reporter
//! normalizes them into the closed `TaskState` enumeration served to
//! clients. Anything that is not PENDING, PROGRESS or a well-formed
//! SUCCESS folds into FAILURE by design.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATE_PENDING: &str = "PENDING";
pub const STATE_PROGRESS: &str = "PROGRESS";
pub const STATE_SUCCESS: &str = "SUCCESS";
pub const STATE_FAILURE: &str = "FAILURE";

/// A job as it travels over the queue list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: String,
    pub input_path: String,
    pub enqueued_at: DateTime<Utc>,
}

impl JobPayload {
    pub fn new(input_path: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            input_path,
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Completed,
    Failed,
}

/// Terminal outcome of processing one image, produced either inline
/// (synchronous fallback) or by a background worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub input_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl ProcessingResult {
    pub fn completed(input_file: String, output_file: String) -> Self {
        Self {
            status: ProcessingStatus::Completed,
            input_file,
            output_file: Some(output_file),
            error: None,
            message: "Image processed successfully".to_string(),
        }
    }

    pub fn failed(input_file: String, error: String) -> Self {
        Self {
            status: ProcessingStatus::Failed,
            input_file,
            output_file: None,
            error: Some(error),
            message: "Failed to process image".to_string(),
        }
    }
}

/// Raw per-task record in the result store, written only by workers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProcessingResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn progress(current: u64, total: u64, status: impl Into<String>) -> Self {
        Self {
            state: STATE_PROGRESS.to_string(),
            current: Some(current),
            total: Some(total),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn success(result: ProcessingResult) -> Self {
        Self {
            state: STATE_SUCCESS.to_string(),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            state: STATE_FAILURE.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Normalized client-facing task state. Serializes with a `state` tag so
/// state-specific fields sit next to it in the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state")]
pub enum TaskState {
    #[serde(rename = "PENDING")]
    Pending { status: String },
    #[serde(rename = "PROGRESS")]
    Progress { current: u64, total: u64, status: String },
    #[serde(rename = "SUCCESS")]
    Success { result: ProcessingResult },
    #[serde(rename = "FAILURE")]
    Failure { error: String },
}

impl TaskState {
    pub fn pending() -> Self {
        TaskState::Pending {
            status: "Task is waiting to be processed".to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success { .. } | TaskState::Failure { .. })
    }

    /// Normalizes a raw record. An absent record means the job is still
    /// queued; unknown states and success records without a result
    /// payload fold into FAILURE.
    pub fn from_record(record: Option<TaskRecord>) -> Self {
        let Some(record) = record else {
            return TaskState::pending();
        };
        match record.state.as_str() {
            STATE_PENDING => TaskState::pending(),
            STATE_PROGRESS => TaskState::Progress {
                current: record.current.unwrap_or(0),
                total: record.total.unwrap_or(1),
                status: record.status.unwrap_or_default(),
            },
            STATE_SUCCESS => match record.result {
                Some(result) => TaskState::Success { result },
                None => TaskState::Failure {
                    error: "success record is missing its result payload".to_string(),
                },
            },
            other => TaskState::Failure {
                error: record
                    .error
                    .unwrap_or_else(|| format!("task ended in state {other}")),
            },
        }
    }
}

/// A registered worker as reported by its heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub hostname: String,
    pub started_at: DateTime<Utc>,
    pub processed: u64,
    pub last_seen: DateTime<Utc>,
}
