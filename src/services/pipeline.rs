use crate::{
    config::PipelineConfig,
    db::DbPool,
    entities::turbine_watermark,
    errors::ServiceError,
    models::{preprocess, WindowAnchor, WindowSchedule},
    repositories::Repositories,
    services::{
        AggregationService, AnomalyDetector, IngestionService, RetentionService, TurbineIngestion,
        WindowSummary,
    },
    source::{CsvDirectorySource, FileSource},
};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Row errors listed per file in a report; the counters stay exact
const MAX_REPORTED_ROW_ERRORS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Reading,
    Validation,
    Ingestion,
    Aggregation,
    Retention,
    Cleanup,
}

/// Something that went wrong during a run without aborting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunIssue {
    pub stage: RunStage,
    /// File name or turbine the issue belongs to
    pub subject: String,
    pub message: String,
}

impl RunIssue {
    fn new(stage: RunStage, subject: impl ToString, message: impl ToString) -> Self {
        Self {
            stage,
            subject: subject.to_string(),
            message: message.to_string(),
        }
    }
}

/// Everything one pipeline invocation did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_found: usize,
    pub files_ingested: usize,
    pub files_removed: usize,
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub rows_filtered: usize,
    /// Valid rows at or before the ingestion watermark
    pub rows_stale: usize,
    pub rows_inserted: u64,
    pub turbines: Vec<TurbineIngestion>,
    pub windows: Vec<WindowSummary>,
    pub anomalies_detected: u64,
    pub rows_swept: u64,
    pub issues: Vec<RunIssue>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            files_found: 0,
            files_ingested: 0,
            files_removed: 0,
            rows_read: 0,
            rows_rejected: 0,
            rows_filtered: 0,
            rows_stale: 0,
            rows_inserted: 0,
            turbines: Vec::new(),
            windows: Vec::new(),
            anomalies_detected: 0,
            rows_swept: 0,
            issues: Vec::new(),
        }
    }

    /// True when no storage or source failure occurred. Row-level validation issues are ignored.
    pub fn is_clean(&self) -> bool {
        self.issues
            .iter()
            .all(|issue| issue.stage == RunStage::Validation)
    }

    pub fn issues_in(&self, stage: RunStage) -> impl Iterator<Item = &RunIssue> {
        self.issues.iter().filter(move |issue| issue.stage == stage)
    }
}

/// Ledger row of a turbine plus the windows its data already allows
#[derive(Debug, Clone, Serialize)]
pub struct TurbineStatus {
    #[serde(flatten)]
    pub watermark: turbine_watermark::Model,
    pub pending_windows: usize,
}

/// Ingestion, aggregation and retention composed into one stateless invocation
#[derive(Clone)]
pub struct PipelineService {
    db: Arc<DbPool>,
    config: PipelineConfig,
    source: Arc<dyn FileSource>,
    repos: Repositories,
    ingestion: IngestionService,
    aggregation: AggregationService,
    retention: RetentionService,
}

impl PipelineService {
    pub fn new(db: Arc<DbPool>, source: Arc<dyn FileSource>, config: PipelineConfig) -> Self {
        let repos = Repositories::new(db.clone());
        let detector = AnomalyDetector::new(repos.anomalies.clone());

        Self {
            ingestion: IngestionService::new(db.clone(), repos.clone(), config.insert_batch_size),
            aggregation: AggregationService::new(
                db.clone(),
                repos.clone(),
                detector,
                config.window(),
            ),
            retention: RetentionService::new(db.clone(), repos.clone()),
            repos,
            db,
            source,
            config,
        }
    }

    /// Pipeline reading `*.csv` batches from `config.data_path`
    pub fn with_csv_directory(db: Arc<DbPool>, config: PipelineConfig) -> Self {
        let source = Arc::new(CsvDirectorySource::new(config.data_path.clone()));
        Self::new(db, source, config)
    }

    pub fn db(&self) -> &Arc<DbPool> {
        &self.db
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn ingestion(&self) -> &IngestionService {
        &self.ingestion
    }

    pub fn aggregation(&self) -> &AggregationService {
        &self.aggregation
    }

    pub fn retention(&self) -> &RetentionService {
        &self.retention
    }

    /// Runs the whole pipeline once.
    ///
    /// Per-file and per-turbine failures are rolled back and listed in the
    /// report; only an unlistable source fails the run.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self) -> Result<RunReport, ServiceError> {
        let started = Instant::now();
        let mut report = RunReport::new();
        tracing::Span::current().record("run_id", tracing::field::display(report.run_id));

        let files = self.source.list_pending().await.map_err(|e| {
            error!(error = %e, "Cannot list batch files");
            e
        })?;
        report.files_found = files.len();

        // newest ingestion watermark per turbine that received data in this run
        let mut touched: BTreeMap<i32, DateTime<Utc>> = BTreeMap::new();

        for file in &files {
            let batch = match self.source.read_batch(file).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(file = %file.name, error = %e, "Skipping unreadable batch file");
                    report
                        .issues
                        .push(RunIssue::new(RunStage::Reading, &file.name, e));
                    continue;
                }
            };

            report.rows_read += batch.rows.len() + batch.row_errors.len();
            let preprocessed = preprocess(batch.rows);
            report.rows_filtered += preprocessed.filtered;

            let row_errors: Vec<_> = batch
                .row_errors
                .into_iter()
                .chain(preprocessed.rejected.iter().cloned())
                .collect();
            report.rows_rejected += row_errors.len();
            if !row_errors.is_empty() {
                warn!(file = %file.name, rejected = row_errors.len(), "Batch file has invalid rows");
            }
            report.issues.extend(
                row_errors
                    .iter()
                    .take(MAX_REPORTED_ROW_ERRORS)
                    .map(|row| {
                        RunIssue::new(
                            RunStage::Validation,
                            format!("{}:{}", file.name, row.line),
                            &row.reason,
                        )
                    }),
            );

            let ingested = self.ingestion.ingest_batch(&file.name, preprocessed).await;
            for turbine in &ingested.turbines {
                report.rows_stale += turbine.stale();
                report.rows_inserted += turbine.inserted;
                if let (true, Some(watermark)) = (turbine.advanced, turbine.watermark) {
                    touched
                        .entry(turbine.turbine_id)
                        .and_modify(|high| *high = (*high).max(watermark))
                        .or_insert(watermark);
                }
            }
            for failure in &ingested.failures {
                report.issues.push(RunIssue::new(
                    RunStage::Ingestion,
                    format!("{} turbine {}", file.name, failure.turbine_id),
                    &failure.error,
                ));
            }

            let fully_ingested = ingested.failures.is_empty();
            report.turbines.extend(ingested.turbines);
            if !fully_ingested {
                continue;
            }
            report.files_ingested += 1;

            if self.config.delete_source_files {
                match self.source.remove(file).await {
                    Ok(()) => report.files_removed += 1,
                    Err(e) => report
                        .issues
                        .push(RunIssue::new(RunStage::Cleanup, &file.name, e)),
                }
            }
        }

        // turbines left behind by earlier runs, bounded by their own ingestion watermark
        match self
            .repos
            .watermarks
            .find_pending_windows(self.aggregation.window_width())
            .await
        {
            Ok(backlog) => {
                for ledger in backlog {
                    if let Some(ingested) = ledger.last_ingested_at {
                        touched.entry(ledger.turbine_id).or_insert(ingested);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Cannot read aggregation backlog");
                report
                    .issues
                    .push(RunIssue::new(RunStage::Aggregation, "ledger", e));
            }
        }

        for (turbine_id, high) in touched {
            let outcome = self
                .aggregation
                .aggregate_turbine(turbine_id, Some(high))
                .await;
            report.anomalies_detected += outcome.anomalies();
            if let Some(error) = outcome.error {
                report.issues.push(RunIssue::new(
                    RunStage::Aggregation,
                    format!("turbine {}", turbine_id),
                    error,
                ));
            }
            report.windows.extend(outcome.windows);
        }

        if self.config.wipe_raw_data {
            match self.retention.sweep_pending().await {
                Ok(sweeps) => {
                    report.rows_swept = sweeps.deleted();
                    for failure in sweeps.failures {
                        report.issues.push(RunIssue::new(
                            RunStage::Retention,
                            format!("turbine {}", failure.turbine_id),
                            failure.error,
                        ));
                    }
                }
                Err(e) => report
                    .issues
                    .push(RunIssue::new(RunStage::Retention, "ledger", e)),
            }
        }

        report.finished_at = Some(Utc::now());
        let elapsed = started.elapsed();
        histogram!("turbine_pipeline.run.duration", elapsed);
        counter!("turbine_pipeline.runs", 1);
        if !report.is_clean() {
            counter!("turbine_pipeline.runs_with_failures", 1);
        }

        info!(
            files = report.files_found,
            inserted = report.rows_inserted,
            windows = report.windows.len(),
            anomalies = report.anomalies_detected,
            swept = report.rows_swept,
            issues = report.issues.len(),
            "Pipeline run finished in {:?}",
            elapsed
        );

        Ok(report)
    }

    /// [`run`](Self::run) bounded by `run_timeout_secs`.
    ///
    /// Units of work cut off by the timeout are rolled back; committed ones stay.
    pub async fn run_with_timeout(&self) -> Result<RunReport, ServiceError> {
        let timeout = self.config.run_timeout();
        tokio::time::timeout(timeout, self.run())
            .await
            .map_err(|_| {
                warn!(?timeout, "Pipeline run timed out");
                ServiceError::Timeout(format!("pipeline run exceeded {:?}", timeout))
            })?
    }

    /// Ledger row of a turbine and how many complete windows await computation.
    pub async fn turbine_status(&self, turbine_id: i32) -> Result<TurbineStatus, ServiceError> {
        let watermark = self
            .repos
            .watermarks
            .find(turbine_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("turbine {}", turbine_id)))?;

        let anchor = match watermark.last_computed_at {
            Some(computed) => Some(WindowAnchor::Computed(computed)),
            None => self
                .repos
                .telemetry
                .find_earliest(self.db.as_ref(), turbine_id)
                .await?
                .map(|first| WindowAnchor::Seed(first.timestamp)),
        };

        let pending_windows = match (anchor, watermark.last_ingested_at) {
            (Some(anchor), Some(ingested)) => {
                WindowSchedule::new(anchor, ingested, self.aggregation.window_width()).count()
            }
            _ => 0,
        };

        Ok(TurbineStatus {
            watermark,
            pending_windows,
        })
    }
}
