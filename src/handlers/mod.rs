pub mod health;
pub mod pipeline;
pub mod telemetry;

use axum::{routing::get, Router};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Read-only telemetry endpoints mounted under `/api/v1`
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/anomalies", get(telemetry::list_anomalies))
        .route("/turbines/:turbine_id/windows", get(telemetry::list_windows))
        .route(
            "/turbines/:turbine_id/watermark",
            get(telemetry::get_watermark),
        )
}

/// Complete application router without middleware
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health::liveness_check))
        .route("/health", get(health::health_check))
        .route("/version", get(health::version_info))
        .route(
            "/fetch",
            get(pipeline::trigger_run).post(pipeline::trigger_run),
        )
        .nest("/api/v1", api_routes())
        .with_state(state)
}
