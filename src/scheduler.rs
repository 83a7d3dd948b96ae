use crate::services::PipelineService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Runs the pipeline every `period` until the task is aborted.
///
/// Runs never overlap within one scheduler: a run that outlasts its period
/// delays the next tick instead of queueing extra runs.
pub fn spawn_periodic(pipeline: Arc<PipelineService>, period: Duration) -> JoinHandle<()> {
    info!(?period, "Starting pipeline scheduler");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match pipeline.run_with_timeout().await {
                Ok(report) if report.is_clean() => {}
                Ok(report) => warn!(
                    run_id = %report.run_id,
                    issues = report.issues.len(),
                    "Scheduled pipeline run finished with issues"
                ),
                Err(e) => error!("Scheduled pipeline run failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::db::{self, DbConfig};
    use tempfile::TempDir;

    #[tokio::test]
    async fn scheduler_ingests_pending_batches_until_aborted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("batch_01.csv"),
            "turbine_id,timestamp,wind_speed,wind_direction,power_output\n\
             1,2023-01-01 00:00:00,10.0,180,1500.0\n\
             1,2023-01-01 01:00:00,11.0,185,1520.0\n",
        )
        .unwrap();
        let pool = db::establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            sqlx_logging: false,
            ..Default::default()
        })
        .await
        .unwrap();
        db::run_migrations(&pool).await.unwrap();

        let config = PipelineConfig {
            data_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let pipeline = Arc::new(PipelineService::with_csv_directory(Arc::new(pool), config));

        let repos = pipeline.repositories().clone();

        let handle = spawn_periodic(pipeline, Duration::from_millis(10));
        let mut ingested = 0;
        for _ in 0..200 {
            ingested = repos.telemetry.count_for_turbine(1).await.unwrap();
            if ingested == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ingested, 2);

        // later ticks find nothing new
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(repos.telemetry.count_for_turbine(1).await.unwrap(), 2);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
