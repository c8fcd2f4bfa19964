//! Dispatch coordinator.
//!
//! Per upload: try to hand the stored input to the job backend; if the
//! backend is unreachable, run the transform inline and answer with a
//! finished result. Backend unavailability is an expected outcome here,
//! not an exception: the service keeps processing images end to end
//! with no queue infrastructure running, at the cost of request latency.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::queue::{JobQueue, ProcessingResult};
use crate::types::{AppError, AppResult};
use crate::vision;

/// Which path served a given upload. Always surfaced to the caller so
/// its follow-up (poll vs. already-done) is well-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Background,
    Synchronous,
}

#[derive(Debug)]
pub enum DispatchOutcome {
    /// Job accepted by the backend; the client polls by task id.
    Background { task_id: String },
    /// Backend unreachable; the transform already ran inline.
    Synchronous { result: ProcessingResult },
}

impl DispatchOutcome {
    pub fn mode(&self) -> DispatchMode {
        match self {
            DispatchOutcome::Background { .. } => DispatchMode::Background,
            DispatchOutcome::Synchronous { .. } => DispatchMode::Synchronous,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    result_dir: PathBuf,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, result_dir: PathBuf) -> Self {
        Self { queue, result_dir }
    }

    /// Dispatches one stored upload. The storage write must already have
    /// happened; `input_path` points at the persisted file.
    pub async fn dispatch(&self, input_path: &Path) -> AppResult<DispatchOutcome> {
        match self.queue.submit(input_path).await {
            Ok(task_id) => {
                info!(%task_id, input = %input_path.display(), "dispatched to background queue");
                Ok(DispatchOutcome::Background { task_id })
            }
            Err(AppError::BackendUnavailable(reason)) => {
                warn!(%reason, "job backend unreachable, processing synchronously");
                let result = self.process_inline(input_path).await?;
                Ok(DispatchOutcome::Synchronous { result })
            }
            Err(other) => Err(other),
        }
    }

    /// Runs the transform on the request path. A processing failure is
    /// returned as data, never as an error.
    async fn process_inline(&self, input_path: &Path) -> AppResult<ProcessingResult> {
        let input = input_path.to_path_buf();
        let result_dir = self.result_dir.clone();
        let outcome =
            tokio::task::spawn_blocking(move || vision::detect_and_draw_contours(&input, &result_dir))
                .await
                .map_err(|e| AppError::Internal(format!("processing task panicked: {e}")))?;

        let input_file = input_path.to_string_lossy().into_owned();
        Ok(match outcome {
            Ok(output) => {
                ProcessingResult::completed(input_file, output.to_string_lossy().into_owned())
            }
            Err(e) => ProcessingResult::failed(input_file, e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::testing::StaticQueue;
    use crate::queue::ProcessingStatus;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn valid_image(dir: &Path) -> PathBuf {
        let mut img = RgbImage::new(32, 32);
        img.put_pixel(16, 16, Rgb([255, 255, 255]));
        let path = dir.join("input.png");
        img.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_backend_up_dispatches_background() {
        let tmp = TempDir::new().unwrap();
        let dispatcher =
            Dispatcher::new(Arc::new(StaticQueue::up()), tmp.path().join("results"));

        let outcome = dispatcher.dispatch(&valid_image(tmp.path())).await.unwrap();
        assert_eq!(outcome.mode(), DispatchMode::Background);
        match outcome {
            DispatchOutcome::Background { task_id } => assert!(!task_id.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_backend_down_falls_back_to_synchronous() {
        let tmp = TempDir::new().unwrap();
        let result_dir = tmp.path().join("results");
        let dispatcher = Dispatcher::new(Arc::new(StaticQueue::down()), result_dir.clone());

        let outcome = dispatcher.dispatch(&valid_image(tmp.path())).await.unwrap();
        assert_eq!(outcome.mode(), DispatchMode::Synchronous);
        match outcome {
            DispatchOutcome::Synchronous { result } => {
                assert_eq!(result.status, ProcessingStatus::Completed);
                let output = PathBuf::from(result.output_file.unwrap());
                assert!(output.starts_with(&result_dir));
                assert!(output.exists());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transform_failure_is_data_not_error() {
        let tmp = TempDir::new().unwrap();
        let corrupt = tmp.path().join("corrupt.jpg");
        std::fs::write(&corrupt, b"not an image").unwrap();
        let dispatcher =
            Dispatcher::new(Arc::new(StaticQueue::down()), tmp.path().join("results"));

        let outcome = dispatcher.dispatch(&corrupt).await.unwrap();
        match outcome {
            DispatchOutcome::Synchronous { result } => {
                assert_eq!(result.status, ProcessingStatus::Failed);
                assert!(result.error.unwrap().contains("decode"));
                assert!(result.output_file.is_none());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
