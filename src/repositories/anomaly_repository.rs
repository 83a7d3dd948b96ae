use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TryInsertResult,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::anomaly::{
    ActiveModel as AnomalyActiveModel, Column, Entity as Anomaly, Model as AnomalyModel,
};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for detected anomalies
#[derive(Debug, Clone)]
pub struct AnomalyRepository {
    base: BaseRepository,
}

impl AnomalyRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Bulk insert; rows whose `(window_id, timestamp)` already exists are skipped.
    pub async fn insert_many_ignoring_duplicates<C: ConnectionTrait>(
        &self,
        conn: &C,
        anomalies: Vec<AnomalyActiveModel>,
    ) -> Result<u64, AppError> {
        if anomalies.is_empty() {
            return Ok(0);
        }

        let result = Anomaly::insert_many(anomalies)
            .on_conflict(
                OnConflict::columns([Column::WindowId, Column::Timestamp])
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec_without_returning(conn)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(match result {
            TryInsertResult::Inserted(rows) => rows,
            TryInsertResult::Conflicted | TryInsertResult::Empty => 0,
        })
    }

    /// All anomalies, newest reading first
    pub async fn find_all(&self, limit: Option<u64>) -> Result<Vec<AnomalyModel>, AppError> {
        let mut query = Anomaly::find()
            .order_by_desc(Column::Timestamp)
            .order_by_asc(Column::TurbineId);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn find_for_turbine(&self, turbine_id: i32) -> Result<Vec<AnomalyModel>, AppError> {
        Anomaly::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_desc(Column::Timestamp)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    pub async fn find_for_window(&self, window_id: Uuid) -> Result<Vec<AnomalyModel>, AppError> {
        Anomaly::find()
            .filter(Column::WindowId.eq(window_id))
            .order_by_asc(Column::Timestamp)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }
}
