use axum::{extract::State, response::Json};
use std::sync::Arc;
use tracing::info;

use crate::{errors::ServiceError, handlers::AppState, services::RunReport};

/// Runs the pipeline immediately and returns its report.
///
/// Safe alongside the scheduler: concurrent runs serialize on the per-turbine ledger rows.
pub async fn trigger_run(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RunReport>, ServiceError> {
    info!("Pipeline run requested over HTTP");
    let report = state.pipeline.run_with_timeout().await?;
    Ok(Json(report))
}
