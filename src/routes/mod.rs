//! API Routes
//!
//! - `POST /images/upload` - upload an image for processing
//! - `GET /images/status/{task_id}` - poll a background task
//! - `GET /images/results` - list processed images
//! - `GET /health`, `/health/redis`, `/health/workers` (alias
//!   `/health/celery`), `/health/full`
//! - `GET /info` - application metadata
//! - `GET /static/results/*` - serve processed images

pub mod health;
pub mod images;

use axum::extract::State;
use axum::response::Redirect;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let result_dir = state.config.storage.result_dir.clone();

    Router::new()
        .route("/", get(root))
        .route("/info", get(app_info))
        .with_state(state.clone())
        .merge(images::router(state.clone()))
        .merge(health::router(state))
        .nest_service("/static/results", ServeDir::new(result_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn root() -> Redirect {
    Redirect::to("/info")
}

/// Application metadata and entry points.
async fn app_info(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.config;
    Json(json!({
        "app_name": cfg.app_name,
        "version": cfg.version,
        "upload_dir": cfg.storage.upload_dir.display().to_string(),
        "result_dir": cfg.storage.result_dir.display().to_string(),
        "max_file_size_mb": cfg.storage.max_file_size as f64 / (1024.0 * 1024.0),
        "allowed_extensions": cfg.storage.allowed_extensions,
        "health_check": "/health",
        "upload_endpoint": "/images/upload",
    }))
}
