use crate::{
    db::{self, DbPool},
    entities::computed_window,
    errors::ServiceError,
    models::{next_window, PowerStats, WindowAnchor},
    repositories::Repositories,
    services::AnomalyDetector,
};
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// One committed window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub window_id: Uuid,
    pub turbine_id: i32,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub sample_count: i32,
    pub mean_power: Option<f64>,
    pub anomalies: u64,
}

impl WindowSummary {
    fn new(window: &computed_window::Model, anomalies: u64) -> Self {
        Self {
            window_id: window.id,
            turbine_id: window.turbine_id,
            window_start: window.window_start,
            window_end: window.window_end,
            sample_count: window.sample_count,
            mean_power: window.mean_power,
            anomalies,
        }
    }
}

/// Windows committed by one aggregation pass over a turbine
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationOutcome {
    pub turbine_id: i32,
    pub windows: Vec<WindowSummary>,
    /// Failure that stopped the pass; earlier windows stay committed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AggregationOutcome {
    pub fn anomalies(&self) -> u64 {
        self.windows.iter().map(|w| w.anomalies).sum()
    }

    pub fn computed_through(&self) -> Option<DateTime<Utc>> {
        self.windows.last().map(|w| w.window_end)
    }
}

/// Walks a turbine's computation watermark forward in fixed-size windows
#[derive(Debug, Clone)]
pub struct AggregationService {
    db: Arc<DbPool>,
    repos: Repositories,
    detector: AnomalyDetector,
    width: Duration,
}

impl AggregationService {
    pub fn new(
        db: Arc<DbPool>,
        repos: Repositories,
        detector: AnomalyDetector,
        width: Duration,
    ) -> Self {
        Self {
            db,
            repos,
            detector,
            width,
        }
    }

    pub fn window_width(&self) -> Duration {
        self.width
    }

    /// Computes every complete window up to `high_watermark`, one transaction per window.
    ///
    /// `None` uses the committed ingestion watermark. A failing window stops the
    /// pass; the error is recorded on the outcome and the next pass resumes there.
    #[instrument(skip(self))]
    pub async fn aggregate_turbine(
        &self,
        turbine_id: i32,
        high_watermark: Option<DateTime<Utc>>,
    ) -> AggregationOutcome {
        let mut outcome = AggregationOutcome {
            turbine_id,
            ..Default::default()
        };

        loop {
            match self.compute_next_window(turbine_id, high_watermark).await {
                Ok(Some(summary)) => outcome.windows.push(summary),
                Ok(None) => break,
                Err(e) => {
                    error!(turbine_id, error = %e, "Window computation rolled back");
                    counter!("turbine_pipeline.window_failures", 1);
                    outcome.error = Some(e.to_string());
                    break;
                }
            }
        }

        if !outcome.windows.is_empty() {
            info!(
                turbine_id,
                windows = outcome.windows.len(),
                anomalies = outcome.anomalies(),
                computed_through = ?outcome.computed_through(),
                "Aggregated telemetry windows"
            );
        }

        outcome
    }

    /// Computes and commits the single next window, if one is complete.
    ///
    /// All window arithmetic is derived from the ledger row locked inside the
    /// transaction, so concurrent callers never compute the same window twice.
    pub async fn compute_next_window(
        &self,
        turbine_id: i32,
        high_watermark: Option<DateTime<Utc>>,
    ) -> Result<Option<WindowSummary>, ServiceError> {
        let repos = self.repos.clone();
        let detector = self.detector.clone();
        let width = self.width;

        let summary = db::transaction(&self.db, "compute_window", move |txn| {
            Box::pin(async move {
                let Some(ledger) = repos.watermarks.lock(txn, turbine_id).await? else {
                    return Ok(None);
                };
                let Some(ingested) = ledger.last_ingested_at else {
                    return Ok(None);
                };
                // never compute past committed ingestion
                let high = high_watermark.map_or(ingested, |h| h.min(ingested));

                let anchor = match ledger.last_computed_at {
                    Some(computed) => WindowAnchor::Computed(computed),
                    None => match repos.telemetry.find_earliest(txn, turbine_id).await? {
                        Some(first) => WindowAnchor::Seed(first.timestamp),
                        None => return Ok(None),
                    },
                };

                let Some(bounds) = next_window(anchor, high, width) else {
                    return Ok(None);
                };

                let readings = repos
                    .telemetry
                    .find_in_window(txn, turbine_id, &bounds)
                    .await?;
                let powers: Vec<f64> = readings.iter().map(|r| r.power_output).collect();
                let stats = PowerStats::from_values(&powers);
                if stats.is_none() {
                    warn!(
                        turbine_id,
                        window_start = %bounds.start,
                        window_end = %bounds.end,
                        "Window has no readings; storing it without statistics"
                    );
                    counter!("turbine_pipeline.empty_windows", 1);
                }

                let window = repos
                    .windows
                    .insert(txn, turbine_id, &bounds, stats.as_ref())
                    .await?;
                let anomalies = detector.detect_and_store(txn, &window, &readings).await?;
                repos
                    .watermarks
                    .advance_computed(txn, ledger, bounds.end)
                    .await?;

                Ok(Some(WindowSummary::new(&window, anomalies)))
            })
        })
        .await?;

        if summary.is_some() {
            counter!("turbine_pipeline.windows_computed", 1);
        }
        Ok(summary)
    }
}
