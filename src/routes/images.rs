//! Image upload, task status and result listing endpoints.

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use tracing::info;

use crate::dispatch::{DispatchMode, DispatchOutcome};
use crate::models::{
    AppState, ResultsResponse, TaskStatusResponse, UploadAccepted, UploadProcessed,
};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    // Leave some headroom over the file cap for multipart framing.
    let body_limit = state.config.storage.max_file_size as usize + 64 * 1024;
    Router::new()
        .route("/images/upload", post(upload_image))
        .route("/images/status/{task_id}", get(task_status))
        .route("/images/results", get(list_processed))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Accepts one multipart file field, persists it and dispatches
/// processing. 202 with a task id when the job backend took it, 200 with
/// an inline result when processing fell back to synchronous mode.
async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut upload: Option<(String, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| AppError::Validation("no file provided".to_string()))?;
        let data = field.bytes().await.map_err(multipart_err)?;
        upload = Some((filename, data));
        break;
    }
    let (filename, data) =
        upload.ok_or_else(|| AppError::Validation("no file provided".to_string()))?;

    let stored = state.store.save_upload(&filename, data).await?;
    let stored_name = stored
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(filename = %stored_name, "upload stored");

    let outcome = state.dispatcher.dispatch(&stored).await?;
    let response = match outcome {
        DispatchOutcome::Background { task_id } => (
            StatusCode::ACCEPTED,
            Json(UploadAccepted {
                message: "Image uploaded successfully".to_string(),
                status: "Contour detection started in background".to_string(),
                task_id,
                filename: stored_name,
                file_path: stored.to_string_lossy().into_owned(),
                mode: DispatchMode::Background,
            }),
        )
            .into_response(),
        DispatchOutcome::Synchronous { result } => (
            StatusCode::OK,
            Json(UploadProcessed {
                message: "Image uploaded and processed successfully".to_string(),
                filename: stored_name,
                file_path: stored.to_string_lossy().into_owned(),
                mode: DispatchMode::Synchronous,
                processing_result: result,
                note: "Job backend unavailable, processed immediately".to_string(),
            }),
        )
            .into_response(),
    };
    Ok(response)
}

/// Reports the normalized state for a task id. 503 with state
/// UNAVAILABLE when the backend cannot be reached; that is a property of
/// the service, not of the job.
async fn task_status(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.queue.query_state(&task_id).await {
        Ok(task_state) => (
            StatusCode::OK,
            Json(TaskStatusResponse {
                task_id,
                state: task_state,
            }),
        )
            .into_response(),
        Err(AppError::BackendUnavailable(reason)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "task_id": task_id,
                "state": "UNAVAILABLE",
                "detail": format!("Task status service unavailable: {reason}"),
            })),
        )
            .into_response(),
        Err(other) => other.into_response(),
    }
}

async fn list_processed(State(state): State<AppState>) -> AppResult<Json<ResultsResponse>> {
    let processed_images = state.store.list_results().await?;
    Ok(Json(ResultsResponse {
        count: processed_images.len(),
        processed_images,
    }))
}

fn multipart_err(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::TooLarge(e.to_string())
    } else {
        AppError::Validation(format!("invalid multipart body: {e}"))
    }
}
