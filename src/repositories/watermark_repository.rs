use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

use crate::entities::turbine_watermark::{
    ActiveModel as WatermarkActiveModel, Column, Entity as TurbineWatermark,
    Model as WatermarkModel,
};
use crate::errors::{AppError, ServiceError};
use crate::repositories::Repository;

use super::BaseRepository;

/// Repository for the per-turbine watermark ledger
#[derive(Debug, Clone)]
pub struct WatermarkRepository {
    base: BaseRepository,
}

impl WatermarkRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Locks a turbine's ledger row for the rest of the transaction.
    ///
    /// `SELECT ... FOR UPDATE` on Postgres; SQLite serializes writers itself.
    pub async fn lock<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
    ) -> Result<Option<WatermarkModel>, AppError> {
        TurbineWatermark::find_by_id(turbine_id)
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Creates an empty ledger row on first contact, then locks it.
    pub async fn lock_or_create<C: ConnectionTrait>(
        &self,
        conn: &C,
        turbine_id: i32,
    ) -> Result<WatermarkModel, AppError> {
        let empty = WatermarkActiveModel {
            turbine_id: Set(turbine_id),
            last_ingested_at: Set(None),
            last_computed_at: Set(None),
            last_swept_at: Set(None),
            updated_at: Set(Utc::now()),
        };

        TurbineWatermark::insert(empty)
            .on_conflict(OnConflict::column(Column::TurbineId).do_nothing().to_owned())
            .do_nothing()
            .exec_without_returning(conn)
            .await
            .map_err(AppError::DatabaseError)?;

        self.lock(conn, turbine_id).await?.ok_or_else(|| {
            ServiceError::DataInconsistency(format!(
                "watermark row for turbine {} vanished after upsert",
                turbine_id
            ))
        })
    }

    /// Raises the ingestion watermark; never moves it backwards.
    pub async fn advance_ingested<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: WatermarkModel,
        newest: DateTime<Utc>,
    ) -> Result<WatermarkModel, AppError> {
        let target = current
            .last_ingested_at
            .map_or(newest, |existing| existing.max(newest));
        if current.last_ingested_at == Some(target) {
            return Ok(current);
        }

        let mut active: WatermarkActiveModel = current.into();
        active.last_ingested_at = Set(Some(target));
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(AppError::DatabaseError)
    }

    /// Moves the computation watermark to the end of a freshly committed window.
    ///
    /// Rejects moves backwards and moves past the ingestion watermark.
    pub async fn advance_computed<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: WatermarkModel,
        window_end: DateTime<Utc>,
    ) -> Result<WatermarkModel, AppError> {
        if let Some(computed) = current.last_computed_at {
            if window_end <= computed {
                return Err(ServiceError::DataInconsistency(format!(
                    "turbine {} computation watermark would move from {} back to {}",
                    current.turbine_id, computed, window_end
                )));
            }
        }
        match current.last_ingested_at {
            Some(ingested) if window_end <= ingested => {}
            other => {
                return Err(ServiceError::DataInconsistency(format!(
                    "turbine {} window end {} is beyond ingestion watermark {:?}",
                    current.turbine_id, window_end, other
                )));
            }
        }

        let mut active: WatermarkActiveModel = current.into();
        active.last_computed_at = Set(Some(window_end));
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(AppError::DatabaseError)
    }

    /// Records that raw rows up to `through` were deleted.
    pub async fn advance_swept<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: WatermarkModel,
        through: DateTime<Utc>,
    ) -> Result<WatermarkModel, AppError> {
        if current.last_swept_at.is_some_and(|swept| swept >= through) {
            return Ok(current);
        }

        let mut active: WatermarkActiveModel = current.into();
        active.last_swept_at = Set(Some(through));
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(AppError::DatabaseError)
    }

    /// Ledger row of one turbine, without locking
    pub async fn find(&self, turbine_id: i32) -> Result<Option<WatermarkModel>, AppError> {
        TurbineWatermark::find_by_id(turbine_id)
            .one(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Every ledger row, by turbine id
    pub async fn find_all(&self) -> Result<Vec<WatermarkModel>, AppError> {
        TurbineWatermark::find()
            .order_by_asc(Column::TurbineId)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)
    }

    /// Ledger rows whose ingested data may close windows not yet committed
    pub async fn find_pending_windows(
        &self,
        width: chrono::Duration,
    ) -> Result<Vec<WatermarkModel>, AppError> {
        let rows = TurbineWatermark::find()
            .filter(Column::LastIngestedAt.is_not_null())
            .order_by_asc(Column::TurbineId)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(rows
            .into_iter()
            .filter(|row| row.aggregation_pending(width))
            .collect())
    }

    /// Ledger rows whose committed windows still cover unswept raw rows
    pub async fn find_pending_sweeps(&self) -> Result<Vec<WatermarkModel>, AppError> {
        let rows = TurbineWatermark::find()
            .filter(Column::LastComputedAt.is_not_null())
            .order_by_asc(Column::TurbineId)
            .all(self.base.get_db())
            .await
            .map_err(AppError::DatabaseError)?;

        Ok(rows.into_iter().filter(WatermarkModel::sweep_pending).collect())
    }
}
