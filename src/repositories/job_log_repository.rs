use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::job_log::{
    ActiveModel as JobLogActiveModel, Column, Entity as JobLog, Model as JobLogModel,
};
use crate::errors::AppError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for the ingestion audit log
#[derive(Debug, Clone)]
pub struct JobLogRepository {
    base: BaseRepository,
}

impl JobLogRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    pub async fn record<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
        source_file: &str,
        rows_inserted: u64,
        last_entry: DateTime<Utc>,
    ) -> Result<JobLogModel, AppError> {
        let entry = JobLogActiveModel {
            id: Set(Uuid::new_v4()),
            turbine_id: Set(turbine_id),
            source_file: Set(source_file.to_string()),
            rows_inserted: Set(i32::try_from(rows_inserted).unwrap_or(i32::MAX)),
            last_entry: Set(last_entry),
            job_timestamp: Set(Utc::now()),
        };

        entry.insert(conn).await.map_err(AppError::DatabaseError)
    }

    /// Log entries of a turbine, newest first
    pub async fn find_for_turbine(&self, turbine_id: i32) -> Result<Vec<JobLogModel>, AppError> {
        JobLog::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_desc(Column::JobTimestamp)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }
}
