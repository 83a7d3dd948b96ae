use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A reading outside its window's two-sigma band.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "anomalies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub window_id: Uuid,
    pub turbine_id: i32,
    /// Timestamp of the offending reading
    pub timestamp: DateTimeUtc,
    pub power_output: f64,
    /// `power_output - window mean`
    pub output_deviation: f64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::computed_window::Entity",
        from = "Column::WindowId",
        to = "super::computed_window::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ComputedWindow,
}

impl Related<super::computed_window::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComputedWindow.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
