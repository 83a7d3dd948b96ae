use crate::{
    db::{self, DbPool},
    errors::ServiceError,
    repositories::Repositories,
    services::TurbineFailure,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub turbine_id: i32,
    /// Raw rows at or before this instant are gone; `None` when nothing was eligible
    pub through: Option<DateTime<Utc>>,
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub swept: Vec<SweepOutcome>,
    pub failures: Vec<TurbineFailure>,
}

impl SweepReport {
    pub fn deleted(&self) -> u64 {
        self.swept.iter().map(|s| s.deleted).sum()
    }
}

/// Deletes raw telemetry already folded into committed windows
#[derive(Debug, Clone)]
pub struct RetentionService {
    db: Arc<DbPool>,
    repos: Repositories,
}

impl RetentionService {
    pub fn new(db: Arc<DbPool>, repos: Repositories) -> Self {
        Self { db, repos }
    }

    /// Deletes a turbine's raw rows at or before `through`, capped at its committed
    /// computation watermark, and records the retention watermark in the same transaction.
    #[instrument(skip(self))]
    pub async fn sweep(
        &self,
        turbine_id: i32,
        through: DateTime<Utc>,
    ) -> Result<SweepOutcome, ServiceError> {
        let repos = self.repos.clone();

        let outcome = db::transaction(&self.db, "retention_sweep", move |txn| {
            Box::pin(async move {
                let nothing = SweepOutcome {
                    turbine_id,
                    through: None,
                    deleted: 0,
                };
                let Some(ledger) = repos.watermarks.lock(txn, turbine_id).await? else {
                    return Ok(nothing);
                };
                let Some(computed) = ledger.last_computed_at else {
                    return Ok(nothing);
                };

                let effective = through.min(computed);
                let deleted = repos
                    .telemetry
                    .delete_through(txn, turbine_id, effective)
                    .await?;
                repos
                    .watermarks
                    .advance_swept(txn, ledger, effective)
                    .await?;

                Ok(SweepOutcome {
                    turbine_id,
                    through: Some(effective),
                    deleted,
                })
            })
        })
        .await?;

        counter!("turbine_pipeline.rows_swept", outcome.deleted);
        if outcome.deleted > 0 {
            info!(
                turbine_id,
                deleted = outcome.deleted,
                through = ?outcome.through,
                "Swept raw telemetry"
            );
        }
        Ok(outcome)
    }

    /// Sweeps every turbine whose retention watermark lags its computation watermark.
    ///
    /// Picks up sweeps interrupted after their windows were committed.
    pub async fn sweep_pending(&self) -> Result<SweepReport, ServiceError> {
        let pending = self.repos.watermarks.find_pending_sweeps().await?;
        let mut report = SweepReport::default();

        for ledger in pending {
            let Some(computed) = ledger.last_computed_at else {
                continue;
            };
            match self.sweep(ledger.turbine_id, computed).await {
                Ok(outcome) => report.swept.push(outcome),
                Err(e) => {
                    error!(turbine_id = ledger.turbine_id, error = %e, "Retention sweep rolled back");
                    report
                        .failures
                        .push(TurbineFailure::new(ledger.turbine_id, e));
                }
            }
        }

        Ok(report)
    }
}
