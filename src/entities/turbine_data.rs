use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One deduplicated telemetry reading.
///
/// `(turbine_id, timestamp)` is unique; raw rows older than the turbine's
/// retention watermark have been deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "turbine_data")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub turbine_id: i32,
    pub wind_speed: f64,
    /// Degrees, `[0, 360)`
    pub wind_direction: i32,
    pub power_output: f64,
    pub timestamp: DateTimeUtc,
    pub ingested_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
