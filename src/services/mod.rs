use serde::Serialize;

// Pipeline stages
pub mod aggregation;
pub mod anomaly_detection;
pub mod ingestion;
pub mod retention;

// Single entry point composing the stages
pub mod pipeline;

pub use aggregation::{AggregationOutcome, AggregationService, WindowSummary};
pub use anomaly_detection::AnomalyDetector;
pub use ingestion::{BatchIngestion, IngestionService, TurbineIngestion};
pub use pipeline::{PipelineService, RunIssue, RunReport, RunStage, TurbineStatus};
pub use retention::{RetentionService, SweepOutcome, SweepReport};

/// A per-turbine unit of work that was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurbineFailure {
    pub turbine_id: i32,
    pub error: String,
}

impl TurbineFailure {
    pub fn new(turbine_id: i32, error: impl ToString) -> Self {
        Self {
            turbine_id,
            error: error.to_string(),
        }
    }
}
