use crate::{
    db::{self, DbPool},
    errors::ServiceError,
    models::{PreprocessedBatch, TelemetryReading},
    repositories::Repositories,
    services::TurbineFailure,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Result of ingesting one turbine's share of a batch file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurbineIngestion {
    pub turbine_id: i32,
    /// Valid rows offered for this turbine
    pub accepted: usize,
    /// Rows newer than the ingestion watermark
    pub retained: usize,
    /// Rows actually written
    pub inserted: u64,
    /// Ingestion watermark after this step
    pub watermark: Option<DateTime<Utc>>,
    /// Whether the watermark moved
    pub advanced: bool,
}

impl TurbineIngestion {
    pub fn stale(&self) -> usize {
        self.accepted - self.retained
    }
}

/// Per-turbine outcomes for one batch file
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchIngestion {
    pub turbines: Vec<TurbineIngestion>,
    pub failures: Vec<TurbineFailure>,
}

impl BatchIngestion {
    pub fn inserted(&self) -> u64 {
        self.turbines.iter().map(|t| t.inserted).sum()
    }
}

/// Deduplicates validated readings against the ingestion watermark and stores the rest
#[derive(Debug, Clone)]
pub struct IngestionService {
    db: Arc<DbPool>,
    repos: Repositories,
    insert_batch_size: usize,
}

impl IngestionService {
    pub fn new(db: Arc<DbPool>, repos: Repositories, insert_batch_size: usize) -> Self {
        Self {
            db,
            repos,
            insert_batch_size,
        }
    }

    /// Ingests every turbine group of a preprocessed batch, each in its own transaction.
    ///
    /// A failing turbine is rolled back and reported; the other turbines proceed.
    pub async fn ingest_batch(&self, source_name: &str, batch: PreprocessedBatch) -> BatchIngestion {
        let mut outcome = BatchIngestion::default();

        for (turbine_id, readings) in batch.by_turbine {
            match self.ingest_turbine(source_name, turbine_id, readings).await {
                Ok(ingested) => outcome.turbines.push(ingested),
                Err(e) => {
                    error!(turbine_id, source = source_name, error = %e, "Turbine ingestion rolled back");
                    outcome.failures.push(TurbineFailure::new(turbine_id, e));
                }
            }
        }

        outcome
    }

    /// Stores the readings newer than the turbine's ingestion watermark and advances it.
    ///
    /// Readings must belong to `turbine_id`. Insert, watermark advance and the
    /// ingestion log entry commit together or not at all.
    #[instrument(skip(self, readings), fields(rows = readings.len()))]
    pub async fn ingest_turbine(
        &self,
        source_name: &str,
        turbine_id: i32,
        readings: Vec<TelemetryReading>,
    ) -> Result<TurbineIngestion, ServiceError> {
        if let Some(stray) = readings.iter().find(|r| r.turbine_id != turbine_id) {
            return Err(ServiceError::InvalidInput(format!(
                "reading for turbine {} offered to turbine {}",
                stray.turbine_id, turbine_id
            )));
        }

        let repos = self.repos.clone();
        let batch_size = self.insert_batch_size;
        let source_name = source_name.to_string();

        let ingested = db::transaction(&self.db, "ingest_turbine", move |txn| {
            Box::pin(async move {
                let ledger = repos.watermarks.lock_or_create(txn, turbine_id).await?;
                let accepted = readings.len();

                let retained: Vec<TelemetryReading> = match ledger.last_ingested_at {
                    Some(watermark) => readings
                        .into_iter()
                        .filter(|r| r.timestamp > watermark)
                        .collect(),
                    None => readings,
                };

                let Some(newest) = retained.iter().map(|r| r.timestamp).max() else {
                    debug!(turbine_id, "No readings newer than the ingestion watermark");
                    return Ok(TurbineIngestion {
                        turbine_id,
                        accepted,
                        retained: 0,
                        inserted: 0,
                        watermark: ledger.last_ingested_at,
                        advanced: false,
                    });
                };

                let inserted = repos
                    .telemetry
                    .insert_ignoring_duplicates(txn, &retained, batch_size)
                    .await?;
                let ledger = repos
                    .watermarks
                    .advance_ingested(txn, ledger, newest)
                    .await?;
                repos
                    .job_logs
                    .record(txn, turbine_id, &source_name, inserted, newest)
                    .await?;

                Ok(TurbineIngestion {
                    turbine_id,
                    accepted,
                    retained: retained.len(),
                    inserted,
                    watermark: ledger.last_ingested_at,
                    advanced: true,
                })
            })
        })
        .await?;

        counter!("turbine_pipeline.rows_inserted", ingested.inserted);
        counter!("turbine_pipeline.rows_stale", ingested.stale() as u64);
        if ingested.advanced {
            info!(
                turbine_id,
                inserted = ingested.inserted,
                watermark = ?ingested.watermark,
                "Ingested telemetry"
            );
        }

        Ok(ingested)
    }
}
