use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::{DispatchMode, Dispatcher};
use crate::queue::{JobQueue, ProcessingResult, TaskState};
use crate::storage::{MediaStore, ResultEntry};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MediaStore,
    pub queue: Arc<dyn JobQueue>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: Config, queue: Arc<dyn JobQueue>) -> Self {
        let config = Arc::new(config);
        let store = MediaStore::new(&config.storage);
        let dispatcher = Dispatcher::new(queue.clone(), config.storage.result_dir.clone());
        Self {
            config,
            store,
            queue,
            dispatcher,
        }
    }
}

// API response types

/// 202 response: the upload was handed to the background queue.
#[derive(Debug, serde::Serialize)]
pub struct UploadAccepted {
    pub message: String,
    pub status: String,
    pub task_id: String,
    pub filename: String,
    pub file_path: String,
    pub mode: DispatchMode,
}

/// 200 response: the backend was unreachable and the upload was
/// processed inline.
#[derive(Debug, serde::Serialize)]
pub struct UploadProcessed {
    pub message: String,
    pub filename: String,
    pub file_path: String,
    pub processing_result: ProcessingResult,
    pub mode: DispatchMode,
    pub note: String,
}

#[derive(Debug, serde::Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    #[serde(flatten)]
    pub state: TaskState,
}

#[derive(Debug, serde::Serialize)]
pub struct ResultsResponse {
    pub processed_images: Vec<ResultEntry>,
    pub count: usize,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{RedisConfig, ServerConfig, StorageConfig};
    use std::path::Path;

    /// App state rooted in a temporary directory, with the given queue
    /// standing in for the Redis backend.
    pub(crate) fn state_with_queue(root: &Path, queue: Arc<dyn JobQueue>) -> AppState {
        let config = Config {
            app_name: "contourd-test".to_string(),
            version: "0.0.0".to_string(),
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageConfig {
                upload_dir: root.join("uploads"),
                result_dir: root.join("results"),
                max_file_size: 10 * 1024 * 1024,
                allowed_extensions: vec![
                    ".jpg".to_string(),
                    ".jpeg".to_string(),
                    ".png".to_string(),
                    ".bmp".to_string(),
                    ".tiff".to_string(),
                ],
            },
            redis: RedisConfig {
                url: "redis://localhost:6379/0".to_string(),
                queue_key: "contour:queue".to_string(),
                task_key_prefix: "contour:task:".to_string(),
                worker_key_prefix: "contour:worker:".to_string(),
                task_ttl_secs: 3600,
            },
        };
        AppState::new(config, queue)
    }
}
