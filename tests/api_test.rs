mod common;

use axum::http::{Method, StatusCode};
use common::{hourly_rows, TestHarness};
use serde_json::Value;

#[tokio::test]
async fn liveness_and_health_endpoints_answer() {
    let harness = TestHarness::new().await;

    let (status, body) = harness.request(Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, body) = harness.request(Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn fetch_runs_the_pipeline_and_returns_the_report() {
    let harness = TestHarness::new().await;
    harness.write_csv(
        "batch_01.csv",
        &hourly_rows(4, 0, 25, |hour| if hour == 12 { 1000.0 } else { 100.0 }),
    );

    let (status, report) = harness.request(Method::POST, "/fetch").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["files_found"], 1);
    assert_eq!(report["rows_inserted"], 25);
    assert_eq!(report["anomalies_detected"], 1);
    assert_eq!(report["windows"].as_array().unwrap().len(), 1);

    // GET triggers a run too; nothing new to do
    let (status, report) = harness.request(Method::GET, "/fetch").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rows_inserted"], 0);
    assert_eq!(report["rows_stale"], 25);

    let (status, anomalies) = harness.request(Method::GET, "/api/v1/anomalies").await;
    assert_eq!(status, StatusCode::OK);
    let anomalies = anomalies.as_array().unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0]["turbine_id"], 4);
    assert_eq!(anomalies[0]["power_output"], 1000.0);

    let (status, windows) = harness
        .request(Method::GET, "/api/v1/turbines/4/windows?limit=10")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(windows.as_array().unwrap().len(), 1);
    assert_eq!(windows[0]["sample_count"], 25);

    let (status, ledger) = harness
        .request(Method::GET, "/api/v1/turbines/4/watermark")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["turbine_id"], 4);
    assert_eq!(ledger["pending_windows"], 0);
    assert!(ledger["last_computed_at"].is_string());
}

#[tokio::test]
async fn anomaly_listing_returns_every_record_unless_limited() {
    let harness = TestHarness::new().await;
    // one spike at noon of each of 120 days
    harness.write_csv(
        "batch_01.csv",
        &hourly_rows(7, 0, 120 * 24 + 1, |hour| {
            if hour % 24 == 12 {
                1000.0
            } else {
                100.0
            }
        }),
    );
    let report = harness.pipeline().run().await.unwrap();
    assert_eq!(report.windows.len(), 120);
    assert_eq!(report.anomalies_detected, 120);

    let (status, anomalies) = harness.request(Method::GET, "/api/v1/anomalies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(anomalies.as_array().unwrap().len(), 120);

    let (status, limited) = harness
        .request(Method::GET, "/api/v1/anomalies?limit=5")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(limited.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn unknown_turbine_watermark_is_not_found() {
    let harness = TestHarness::new().await;

    let (status, body) = harness
        .request(Method::GET, "/api/v1/turbines/17/watermark")
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
    assert!(body["message"].as_str().unwrap().contains("turbine 17"));
}

#[tokio::test]
async fn out_of_range_limit_is_rejected() {
    let harness = TestHarness::new().await;

    let (status, body) = harness
        .request(Method::GET, "/api/v1/anomalies?limit=0")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
}
