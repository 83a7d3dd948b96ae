use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

use crate::handlers::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub database_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Records the process start for uptime reporting; call once on startup
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map_or(0, |t| t.elapsed().as_secs())
}

/// Liveness probe: the process answers
pub async fn liveness_check() -> &'static str {
    "ok"
}

/// Readiness probe: the database answers a ping
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_check_start = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let database_latency_ms = db_check_start.elapsed().as_millis() as u64;

    let (status_code, status) = match db_result {
        Ok(()) => (StatusCode::OK, ComponentStatus::Up),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Down),
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: uptime_secs(),
        database_latency_ms,
        error: db_result.err().map(|e| e.to_string()),
    };

    (status_code, Json(response))
}

/// Build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
