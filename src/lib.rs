// contourd - background image processing service with contour detection

pub mod config;
pub mod dispatch;
pub mod models;
pub mod queue;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;
pub mod vision;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
