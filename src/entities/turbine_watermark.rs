use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-turbine progress ledger.
///
/// Every unit of work of the pipeline starts by locking this row; the
/// watermarks only ever move forward and satisfy
/// `last_swept_at <= last_computed_at <= last_ingested_at`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "turbine_watermarks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub turbine_id: i32,
    /// Newest reading committed by ingestion
    pub last_ingested_at: Option<DateTimeUtc>,
    /// End of the newest committed aggregation window
    pub last_computed_at: Option<DateTimeUtc>,
    /// Raw rows at or before this instant have been deleted
    pub last_swept_at: Option<DateTimeUtc>,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// True when committed windows cover raw rows that have not been swept yet.
    pub fn sweep_pending(&self) -> bool {
        match (self.last_computed_at, self.last_swept_at) {
            (Some(computed), Some(swept)) => swept < computed,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// True when ingested data may already close a window that was never committed.
    ///
    /// Without a committed window the seed lives in the raw rows, so any
    /// ingested turbine counts as pending.
    pub fn aggregation_pending(&self, width: chrono::Duration) -> bool {
        match (self.last_computed_at, self.last_ingested_at) {
            (Some(computed), Some(ingested)) => computed
                .checked_add_signed(width)
                .is_some_and(|end| end <= ingested),
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ledger(computed: Option<i64>, ingested: Option<i64>) -> Model {
        let hour = |h: i64| Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::hours(h);
        Model {
            turbine_id: 1,
            last_ingested_at: ingested.map(hour),
            last_computed_at: computed.map(hour),
            last_swept_at: None,
            updated_at: hour(0),
        }
    }

    #[test]
    fn aggregation_pending_needs_a_whole_window_of_ingested_data() {
        let day = Duration::hours(24);
        assert!(ledger(Some(24), Some(48)).aggregation_pending(day));
        assert!(!ledger(Some(24), Some(47)).aggregation_pending(day));
        assert!(ledger(None, Some(3)).aggregation_pending(day));
        assert!(!ledger(None, None).aggregation_pending(day));
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
