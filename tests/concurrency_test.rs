//! The SQLite harness uses a single-connection pool, so these races are
//! serialized by the pool and the `FOR UPDATE` ledger lock is never contended.
//! Set `TURBINE_TEST_POSTGRES_URL` and run with `--ignored` to race real
//! connections against Postgres.

mod common;

use common::{at, hourly_rows, TestHarness};

#[tokio::test]
async fn concurrent_aggregation_never_duplicates_windows() {
    let harness = TestHarness::new().await;
    harness.write_csv("batch_01.csv", &hourly_rows(1, 0, 73, |_| 100.0));
    let pipeline = harness.pipeline();

    // ingest only, so every task below races for the same three windows
    let batch = turbine_telemetry::source::read_csv_batch(&harness.data_path().join("batch_01.csv"))
        .unwrap();
    let ingested = pipeline
        .ingestion()
        .ingest_batch("batch_01.csv", turbine_telemetry::models::preprocess(batch.rows))
        .await;
    assert!(ingested.failures.is_empty());

    let mut tasks = vec![];
    for _ in 0..4 {
        let aggregation = pipeline.aggregation().clone();
        tasks.push(tokio::spawn(async move {
            aggregation.aggregate_turbine(1, None).await
        }));
    }

    let mut computed = 0;
    for task in tasks {
        let outcome = task.await.unwrap();
        assert_eq!(outcome.error, None);
        computed += outcome.windows.len();
    }
    assert_eq!(computed, 3, "each window is computed by exactly one task");

    let windows = pipeline
        .repositories()
        .windows
        .find_for_turbine_ascending(1)
        .await
        .unwrap();
    let ends: Vec<_> = windows.iter().map(|w| w.window_end).collect();
    assert_eq!(ends, vec![at(24), at(48), at(72)]);
}

#[tokio::test]
async fn concurrent_runs_ingest_each_row_once() {
    let harness = TestHarness::new().await;
    harness.write_csv("batch_01.csv", &hourly_rows(1, 0, 49, |_| 100.0));
    harness.write_csv("batch_02.csv", &hourly_rows(2, 0, 49, |_| 100.0));

    let first = harness.pipeline();
    let second = harness.pipeline();
    let (a, b) = tokio::join!(first.run(), second.run());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.rows_inserted + b.rows_inserted, 98);
    assert_eq!(a.windows.len() + b.windows.len(), 4);

    let repos = first.repositories();
    for turbine_id in [1, 2] {
        assert_eq!(repos.telemetry.count_for_turbine(turbine_id).await.unwrap(), 49);
        assert_eq!(repos.windows.count_for_turbine(turbine_id).await.unwrap(), 2);
        assert_eq!(repos.job_logs.find_for_turbine(turbine_id).await.unwrap().len(), 1);
    }
}

#[tokio::test]
#[ignore = "needs TURBINE_TEST_POSTGRES_URL"]
async fn ledger_lock_serializes_aggregation_on_postgres() {
    let Ok(url) = std::env::var("TURBINE_TEST_POSTGRES_URL") else {
        return;
    };
    let harness = TestHarness::with_database_url(&url, 8).await;
    harness
        .execute(
            "TRUNCATE anomalies, computed_windows, job_logs, turbine_data, turbine_watermarks",
        )
        .await;
    harness.write_csv("batch_01.csv", &hourly_rows(1, 0, 73, |_| 100.0));
    let pipeline = harness.pipeline();

    let batch = turbine_telemetry::source::read_csv_batch(&harness.data_path().join("batch_01.csv"))
        .unwrap();
    let ingested = pipeline
        .ingestion()
        .ingest_batch("batch_01.csv", turbine_telemetry::models::preprocess(batch.rows))
        .await;
    assert!(ingested.failures.is_empty());

    let mut tasks = vec![];
    for _ in 0..8 {
        let aggregation = pipeline.aggregation().clone();
        tasks.push(tokio::spawn(async move {
            aggregation.aggregate_turbine(1, None).await
        }));
    }

    let mut computed = 0;
    for task in tasks {
        let outcome = task.await.unwrap();
        assert_eq!(outcome.error, None);
        computed += outcome.windows.len();
    }
    assert_eq!(computed, 3);
    assert_eq!(
        pipeline.repositories().windows.count_for_turbine(1).await.unwrap(),
        3
    );
}
