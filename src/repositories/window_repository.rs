use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::computed_window::{
    ActiveModel as WindowActiveModel, Column, Entity as ComputedWindow, Model as WindowModel,
};
use crate::errors::AppError;
use crate::models::{PowerStats, WindowBounds};
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for computed aggregation windows
#[derive(Debug, Clone)]
pub struct WindowRepository {
    base: BaseRepository,
}

impl WindowRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Stores a window; `stats` is `None` for a window without readings.
    ///
    /// Fails on the unique `(turbine_id, window_start, window_end)` index if the
    /// window already exists.
    pub async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
        bounds: &WindowBounds,
        stats: Option<&PowerStats>,
    ) -> Result<WindowModel, AppError> {
        let window = WindowActiveModel {
            id: Set(Uuid::new_v4()),
            turbine_id: Set(turbine_id),
            compute_time_window: Set(bounds.width().num_seconds()),
            window_start: Set(bounds.start),
            window_end: Set(bounds.end),
            sample_count: Set(stats.map_or(0, |s| s.count as i32)),
            min_power: Set(stats.map(|s| s.min)),
            max_power: Set(stats.map(|s| s.max)),
            mean_power: Set(stats.map(|s| s.mean)),
            created_at: Set(Utc::now()),
        };

        window.insert(conn).await.map_err(AppError::DatabaseError)
    }

    /// Windows of a turbine, newest first
    pub async fn find_for_turbine(
        &self,
        turbine_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<WindowModel>, AppError> {
        let mut query = ComputedWindow::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_desc(Column::WindowEnd);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Windows of a turbine in computation order
    pub async fn find_for_turbine_ascending(
        &self,
        turbine_id: i32,
    ) -> Result<Vec<WindowModel>, AppError> {
        ComputedWindow::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_asc(Column::WindowEnd)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn count_for_turbine(&self, turbine_id: i32) -> Result<u64, AppError> {
        ComputedWindow::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .count(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }
}
