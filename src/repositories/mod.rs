use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod anomaly_repository;
pub mod job_log_repository;
pub mod telemetry_repository;
pub mod watermark_repository;
pub mod window_repository;

pub use anomaly_repository::AnomalyRepository;
pub use job_log_repository::JobLogRepository;
pub use telemetry_repository::TelemetryRepository;
pub use watermark_repository::WatermarkRepository;
pub use window_repository::WindowRepository;

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// One repository per persisted entity, sharing a connection pool.
///
/// Write operations take the connection explicitly so services can run them
/// inside their own transactions.
#[derive(Debug, Clone)]
pub struct Repositories {
    pub telemetry: TelemetryRepository,
    pub watermarks: WatermarkRepository,
    pub windows: WindowRepository,
    pub anomalies: AnomalyRepository,
    pub job_logs: JobLogRepository,
}

impl Repositories {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            telemetry: TelemetryRepository::new(db.clone()),
            watermarks: WatermarkRepository::new(db.clone()),
            windows: WindowRepository::new(db.clone()),
            anomalies: AnomalyRepository::new(db.clone()),
            job_logs: JobLogRepository::new(db),
        }
    }
}
