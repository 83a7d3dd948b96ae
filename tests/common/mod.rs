#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::{ConnectionTrait, Statement};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use turbine_telemetry::{
    config::{AppConfig, PipelineConfig},
    db::{self, DbPool},
    services::PipelineService,
    AppState,
};

/// One CSV line of a telemetry batch
#[derive(Debug, Clone, Copy)]
pub struct CsvRow {
    pub turbine_id: i32,
    pub timestamp: DateTime<Utc>,
    pub wind_speed: f64,
    pub wind_direction: i32,
    pub power_output: f64,
}

impl CsvRow {
    pub fn new(turbine_id: i32, timestamp: DateTime<Utc>, power_output: f64) -> Self {
        Self {
            turbine_id,
            timestamp,
            wind_speed: 10.0,
            wind_direction: 180,
            power_output,
        }
    }

    fn render(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.turbine_id,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.wind_speed,
            self.wind_direction,
            self.power_output
        )
    }
}

/// Hour offset from 2023-01-01T00:00:00Z
pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

/// `count` hourly readings starting at hour `from`, with power chosen per hour offset
pub fn hourly_rows(
    turbine_id: i32,
    from: i64,
    count: i64,
    power: impl Fn(i64) -> f64,
) -> Vec<CsvRow> {
    (from..from + count)
        .map(|hour| CsvRow::new(turbine_id, at(hour), power(hour)))
        .collect()
}

/// Temp-file SQLite database plus a batch directory, wired the way the service wires them.
pub struct TestHarness {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    data_dir: TempDir,
    _db_dir: TempDir,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_pipeline(|_| {}).await
    }

    /// Harness with an adjusted pipeline configuration; the window defaults to one day.
    pub async fn with_pipeline(adjust: impl FnOnce(&mut PipelineConfig)) -> Self {
        let db_dir = TempDir::new().expect("temp db dir");
        let db_file = db_dir.path().join("telemetry_test.db");
        // SQLite allows one writer; a single connection keeps tests deterministic
        Self::build(
            format!("sqlite://{}?mode=rwc", db_file.display()),
            1,
            db_dir,
            adjust,
        )
        .await
    }

    /// Harness over an external database with a multi-connection pool
    pub async fn with_database_url(url: &str, max_connections: u32) -> Self {
        let db_dir = TempDir::new().expect("temp db dir");
        Self::build(url.to_string(), max_connections, db_dir, |_| {}).await
    }

    async fn build(
        url: String,
        max_connections: u32,
        db_dir: TempDir,
        adjust: impl FnOnce(&mut PipelineConfig),
    ) -> Self {
        let data_dir = TempDir::new().expect("temp data dir");

        let mut cfg = AppConfig::new(url, "127.0.0.1".to_string(), 18_080, "test".to_string());
        cfg.auto_migrate = true;
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        cfg.pipeline.data_path = data_dir.path().to_path_buf();
        cfg.pipeline.schedule_interval_secs = 0;
        adjust(&mut cfg.pipeline);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        Self {
            db: Arc::new(pool),
            config: cfg,
            data_dir,
            _db_dir: db_dir,
        }
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }

    pub fn pipeline(&self) -> PipelineService {
        PipelineService::with_csv_directory(self.db.clone(), self.config.pipeline.clone())
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(self.db.clone(), self.config.clone()))
    }

    /// Writes a batch file with the canonical header
    pub fn write_csv(&self, name: &str, rows: &[CsvRow]) -> PathBuf {
        let mut content =
            String::from("turbine_id,timestamp,wind_speed,wind_direction,power_output\n");
        for row in rows {
            content.push_str(&row.render());
            content.push('\n');
        }
        self.write_raw(name, content.as_bytes())
    }

    pub fn write_raw(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.data_dir.path().join(name);
        std::fs::write(&path, content).expect("write batch file");
        path
    }

    pub async fn execute(&self, sql: &str) {
        self.db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                sql.to_string(),
            ))
            .await
            .expect("raw statement");
    }

    /// Sends a request through the full router and decodes the JSON body
    pub async fn request(&self, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");

        let response = turbine_telemetry::app(self.state())
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let value = serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        (status, value)
    }
}
