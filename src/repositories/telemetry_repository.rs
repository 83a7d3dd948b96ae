use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TryInsertResult,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::turbine_data::{
    ActiveModel as TelemetryActiveModel, Column, Entity as TurbineData, Model as TelemetryModel,
};
use crate::errors::AppError;
use crate::models::{TelemetryReading, WindowBounds};
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for raw telemetry rows
#[derive(Debug, Clone)]
pub struct TelemetryRepository {
    base: BaseRepository,
}

impl TelemetryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Inserts readings in chunks of `batch_size`, skipping `(turbine_id, timestamp)` pairs
    /// that already exist. Returns the number of rows actually written.
    pub async fn insert_ignoring_duplicates<C: ConnectionTrait>(
        &self,
        conn: &C,
        readings: &[TelemetryReading],
        batch_size: usize,
    ) -> Result<u64, AppError> {
        let ingested_at = Utc::now();
        let mut inserted = 0;

        for chunk in readings.chunks(batch_size.max(1)) {
            let models = chunk.iter().map(|reading| TelemetryActiveModel {
                id: Set(Uuid::new_v4()),
                turbine_id: Set(reading.turbine_id),
                wind_speed: Set(reading.wind_speed),
                wind_direction: Set(reading.wind_direction),
                power_output: Set(reading.power_output),
                timestamp: Set(reading.timestamp),
                ingested_at: Set(ingested_at),
            });

            let result = TurbineData::insert_many(models)
                .on_conflict(
                    OnConflict::columns([Column::TurbineId, Column::Timestamp])
                        .do_nothing()
                        .to_owned(),
                )
                .do_nothing()
                .exec_without_returning(conn)
                .await
                .map_err(AppError::DatabaseError)?;

            if let TryInsertResult::Inserted(rows) = result {
                inserted += rows;
            }
        }

        Ok(inserted)
    }

    /// Oldest stored reading of a turbine
    pub async fn find_earliest<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
    ) -> Result<Option<TelemetryModel>, AppError> {
        TurbineData::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_asc(Column::Timestamp)
            .one(conn)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Readings that fall into a window, oldest first
    pub async fn find_in_window<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
        bounds: &WindowBounds,
    ) -> Result<Vec<TelemetryModel>, AppError> {
        let lower = if bounds.includes_start {
            Column::Timestamp.gte(bounds.start)
        } else {
            Column::Timestamp.gt(bounds.start)
        };

        TurbineData::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .filter(lower)
            .filter(Column::Timestamp.lte(bounds.end))
            .order_by_asc(Column::Timestamp)
            .all(conn)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Deletes a turbine's readings at or before `through`
    pub async fn delete_through<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
        through: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let result = TurbineData::delete_many()
            .filter(Column::TurbineId.eq(turbine_id))
            .filter(Column::Timestamp.lte(through))
            .exec(conn)
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(result.rows_affected)
    }

    /// Number of stored readings of a turbine
    pub async fn count_for_turbine(&self, turbine_id: i32) -> Result<u64, AppError> {
        TurbineData::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .count(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// All readings of a turbine, oldest first
    pub async fn find_for_turbine(&self, turbine_id: i32) -> Result<Vec<TelemetryModel>, AppError> {
        TurbineData::find()
            .filter(Column::TurbineId.eq(turbine_id))
            .order_by_asc(Column::Timestamp)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }
}
