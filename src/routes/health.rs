//! Health check endpoints: liveness, backend connectivity, worker-pool
//! liveness and a composite report.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::models::AppState;
use crate::queue::WorkerInfo;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/", get(health_check))
        .route("/health/redis", get(redis_health))
        .route("/health/workers", get(workers_health))
        // Alias kept for clients written against the original API.
        .route("/health/celery", get(workers_health))
        .route("/health/full", get(full_health))
        .with_state(state)
}

fn basic_payload(state: &AppState) -> Value {
    json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "app_name": state.config.app_name,
        "version": state.config.version,
        "upload_dir": state.config.storage.upload_dir.display().to_string(),
        "result_dir": state.config.storage.result_dir.display().to_string(),
    })
}

/// Basic liveness: the process is up and serving.
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(basic_payload(&state))
}

/// Round-trips a probe value through the result store.
async fn redis_health(State(state): State<AppState>) -> Response {
    match state.queue.ping_roundtrip().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "redis_url": state.config.redis.url,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// At least one live worker must be registered.
async fn workers_health(State(state): State<AppState>) -> Response {
    match state.queue.list_workers().await {
        Ok(workers) if workers.is_empty() => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "No active workers registered" })),
        )
            .into_response(),
        Ok(workers) => Json(workers_payload(&workers)).into_response(),
        Err(e) => e.into_response(),
    }
}

fn workers_payload(workers: &[WorkerInfo]) -> Value {
    json!({
        "status": "healthy",
        "active_workers": workers.iter().map(|w| w.id.clone()).collect::<Vec<_>>(),
        "worker_count": workers.len(),
        "stats": workers,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Composite check. Any failing sub-check degrades the overall status
/// (503) while each component still reports its own detail.
async fn full_health(State(state): State<AppState>) -> Response {
    let mut components = serde_json::Map::new();
    let mut healthy = true;

    components.insert(
        "app".to_string(),
        json!({ "status": "healthy", "details": basic_payload(&state) }),
    );

    let redis = match state.queue.ping_roundtrip().await {
        Ok(()) => json!({
            "status": "healthy",
            "details": { "redis_url": state.config.redis.url },
        }),
        Err(e) => {
            healthy = false;
            json!({ "status": "unhealthy", "error": e.to_string() })
        }
    };
    components.insert("redis".to_string(), redis);

    let workers = match state.queue.list_workers().await {
        Ok(workers) if workers.is_empty() => {
            healthy = false;
            json!({ "status": "unhealthy", "error": "No active workers registered" })
        }
        Ok(workers) => json!({ "status": "healthy", "details": workers_payload(&workers) }),
        Err(e) => {
            healthy = false;
            json!({ "status": "unhealthy", "error": e.to_string() })
        }
    };
    components.insert("workers".to_string(), workers);

    let body = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "overall_status": if healthy { "healthy" } else { "degraded" },
        "components": components,
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}
