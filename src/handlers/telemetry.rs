use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::{
    entities::{anomaly, computed_window},
    errors::ServiceError,
    handlers::AppState,
    services::TurbineStatus,
};

/// Window listings without an explicit `limit`
const DEFAULT_WINDOW_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, Default, Validate)]
pub struct ListQuery {
    #[validate(range(min = 1, max = 10000))]
    pub limit: Option<u64>,
    /// Restricts anomalies to one turbine
    pub turbine_id: Option<i32>,
}

/// Anomalies, newest reading first; every record unless `limit` is given
pub async fn list_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<anomaly::Model>>, ServiceError> {
    query.validate()?;
    let anomalies = state.pipeline.repositories().anomalies.clone();

    let mut rows = match query.turbine_id {
        Some(turbine_id) => anomalies.find_for_turbine(turbine_id).await?,
        None => anomalies.find_all(query.limit).await?,
    };
    if let Some(limit) = query.limit {
        rows.truncate(limit as usize);
    }
    Ok(Json(rows))
}

/// Computed windows of one turbine, newest first
pub async fn list_windows(
    State(state): State<Arc<AppState>>,
    Path(turbine_id): Path<i32>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<computed_window::Model>>, ServiceError> {
    query.validate()?;
    let windows = state
        .pipeline
        .repositories()
        .windows
        .find_for_turbine(
            turbine_id,
            Some(query.limit.unwrap_or(DEFAULT_WINDOW_LIMIT)),
        )
        .await?;
    Ok(Json(windows))
}

/// Watermark ledger row of one turbine
pub async fn get_watermark(
    State(state): State<Arc<AppState>>,
    Path(turbine_id): Path<i32>,
) -> Result<Json<TurbineStatus>, ServiceError> {
    let status = state.pipeline.turbine_status(turbine_id).await?;
    Ok(Json(status))
}
