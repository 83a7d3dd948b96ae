use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_DATA_PATH: &str = "data";
const DEFAULT_COMPUTE_TIME_WINDOW_SECS: i64 = 86_400;
const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 60;
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;
const DEFAULT_INSERT_BATCH_SIZE: usize = 500;

/// Settings for the ingestion, aggregation and retention pipeline
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory scanned for `*.csv` telemetry batches
    #[serde(default = "default_data_path")]
    #[validate(custom = "validate_data_path")]
    pub data_path: PathBuf,

    /// Aggregation window length in seconds, at most ten years
    #[serde(default = "default_compute_time_window_secs")]
    #[validate(range(min = 1, max = 315360000))]
    pub compute_time_window_secs: i64,

    /// Delete raw rows once they are folded into a committed window
    #[serde(default)]
    pub wipe_raw_data: bool,

    /// Remove batch files after they were ingested without storage failures
    #[serde(default)]
    pub delete_source_files: bool,

    /// Scheduler period in seconds, 0 disables the scheduler
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,

    /// Upper bound for one pipeline run
    #[serde(default = "default_run_timeout_secs")]
    #[validate(range(min = 1))]
    pub run_timeout_secs: u64,

    /// Rows per INSERT statement during ingestion
    #[serde(default = "default_insert_batch_size")]
    #[validate(range(min = 1, max = 5000))]
    pub insert_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            compute_time_window_secs: DEFAULT_COMPUTE_TIME_WINDOW_SECS,
            wipe_raw_data: false,
            delete_source_files: false,
            schedule_interval_secs: DEFAULT_SCHEDULE_INTERVAL_SECS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.compute_time_window_secs)
    }

    pub fn schedule_interval(&self) -> Option<Duration> {
        (self.schedule_interval_secs > 0).then(|| Duration::from_secs(self.schedule_interval_secs))
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Pipeline behaviour
    #[serde(default)]
    #[validate]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_data_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_PATH)
}

fn default_compute_time_window_secs() -> i64 {
    DEFAULT_COMPUTE_TIME_WINDOW_SECS
}

fn default_schedule_interval_secs() -> u64 {
    DEFAULT_SCHEDULE_INTERVAL_SECS
}

fn default_run_timeout_secs() -> u64 {
    DEFAULT_RUN_TIMEOUT_SECS
}

fn default_insert_batch_size() -> usize {
    DEFAULT_INSERT_BATCH_SIZE
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_data_path(path: &PathBuf) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        let mut err = ValidationError::new("data_path");
        err.message = Some("Must point at the directory holding telemetry batches".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("turbine_telemetry={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*, e.g. APP__PIPELINE__DATA_PATH)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] with an explicit configuration directory
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://turbine_telemetry.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        )
    }

    fn config_dir_with(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "{}", content).unwrap();
        dir
    }

    #[test]
    fn defaults_pass_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pipeline.compute_time_window_secs, 86_400);
        assert!(!cfg.pipeline.wipe_raw_data);
        assert_eq!(cfg.pipeline.window(), chrono::Duration::days(1));
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut cfg = base_config();
        cfg.pipeline.compute_time_window_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn oversized_window_is_rejected() {
        let mut cfg = base_config();
        cfg.pipeline.compute_time_window_secs = i64::MAX;
        assert!(cfg.validate().is_err());
        let errors = cfg.pipeline.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("compute_time_window_secs"));

        cfg.pipeline.compute_time_window_secs = 315_360_000;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = base_config();
        cfg.log_level = "loud".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn zero_schedule_interval_disables_scheduler() {
        let mut pipeline = PipelineConfig::default();
        assert_eq!(pipeline.schedule_interval(), Some(Duration::from_secs(60)));
        pipeline.schedule_interval_secs = 0;
        assert_eq!(pipeline.schedule_interval(), None);
    }

    #[test]
    fn loads_pipeline_section_from_file() {
        let dir = config_dir_with(
            r#"
            database_url = "sqlite://from-file.db?mode=rwc"
            host = "127.0.0.1"
            environment = "development"

            [pipeline]
            data_path = "/var/lib/turbines"
            compute_time_window_secs = 3600
            wipe_raw_data = true
            "#,
        );

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.pipeline.data_path, PathBuf::from("/var/lib/turbines"));
        assert_eq!(cfg.pipeline.compute_time_window_secs, 3600);
        assert!(cfg.pipeline.wipe_raw_data);
        assert!(!cfg.pipeline.delete_source_files);
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let dir = config_dir_with(
            r#"
            database_url = "sqlite::memory:"
            host = "127.0.0.1"
            environment = "development"
            log_level = "chatty"

            [pipeline]
            insert_batch_size = 0
            "#,
        );

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
