use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit row appended for every committed turbine ingestion.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub turbine_id: i32,
    pub source_file: String,
    pub rows_inserted: i32,
    pub last_entry: DateTimeUtc,
    pub job_timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
