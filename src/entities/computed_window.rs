use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Power statistics for one turbine over `(window_start, window_end]`.
///
/// The first window of a turbine also includes `window_start`. A window
/// without readings keeps `sample_count = 0` and null statistics.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "computed_windows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub turbine_id: i32,
    /// Window length in seconds
    pub compute_time_window: i64,
    pub window_start: DateTimeUtc,
    pub window_end: DateTimeUtc,
    pub sample_count: i32,
    pub min_power: Option<f64>,
    pub max_power: Option<f64>,
    pub mean_power: Option<f64>,
    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::anomaly::Entity")]
    Anomalies,
}

impl Related<super::anomaly::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Anomalies.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
