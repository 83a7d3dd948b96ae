use crate::{
    entities::{anomaly, computed_window, turbine_data},
    errors::ServiceError,
    models::two_sigma_outliers,
    repositories::AnomalyRepository,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{ConnectionTrait, Set};
use tracing::debug;
use uuid::Uuid;

/// Flags readings outside their window's `mean ± 2σ` band
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    anomalies: AnomalyRepository,
}

impl AnomalyDetector {
    pub fn new(anomalies: AnomalyRepository) -> Self {
        Self { anomalies }
    }

    /// Anomaly rows for `readings`, which must be exactly the window's readings.
    pub fn classify(
        window: &computed_window::Model,
        readings: &[turbine_data::Model],
    ) -> Vec<anomaly::ActiveModel> {
        let powers: Vec<f64> = readings.iter().map(|r| r.power_output).collect();
        let created_at = Utc::now();

        two_sigma_outliers(&powers)
            .into_iter()
            .map(|outlier| {
                let reading = &readings[outlier.index];
                anomaly::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    window_id: Set(window.id),
                    turbine_id: Set(window.turbine_id),
                    timestamp: Set(reading.timestamp),
                    power_output: Set(outlier.value),
                    output_deviation: Set(outlier.deviation),
                    created_at: Set(created_at),
                }
            })
            .collect()
    }

    /// Classifies a window's readings and stores the anomalies on `conn`.
    ///
    /// Returns the number of anomalies written.
    pub async fn detect_and_store<C: ConnectionTrait>(
        &self,
        conn: &C,
        window: &computed_window::Model,
        readings: &[turbine_data::Model],
    ) -> Result<u64, ServiceError> {
        let anomalies = Self::classify(window, readings);
        if anomalies.is_empty() {
            return Ok(0);
        }

        let stored = self
            .anomalies
            .insert_many_ignoring_duplicates(conn, anomalies)
            .await?;

        counter!("turbine_pipeline.anomalies_detected", stored);
        debug!(
            turbine_id = window.turbine_id,
            window_id = %window.id,
            stored,
            "Stored window anomalies"
        );
        Ok(stored)
    }
}
