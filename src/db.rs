use crate::config::AppConfig;
use crate::errors::{AppError, ServiceError};
use anyhow::Context;
use futures::future::BoxFuture;
use metrics::{counter, gauge, histogram};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub type DbPool = DatabaseConnection;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub sqlx_logging: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
            sqlx_logging: true,
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
            sqlx_logging: true,
        }
    }
}

pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, AppError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(config.sqlx_logging);

    gauge!("turbine_db.max_connections", config.max_connections as f64);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt)
        .await
        .context("Database connection establishment failed")?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, AppError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs `f` inside a database transaction labelled `operation`.
///
/// The transaction commits when `f` returns `Ok` and rolls back otherwise;
/// commit, rollback and duration are recorded as metrics.
pub async fn transaction<F, T>(db: &DbPool, operation: &'static str, f: F) -> Result<T, ServiceError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, ServiceError>> + Send,
    T: Send + 'static,
{
    let transaction_id = Uuid::new_v4();
    let start = Instant::now();

    debug!(transaction_id = %transaction_id, operation, "Starting database transaction");
    counter!("turbine_db.transaction.started", 1, "operation" => operation);

    let result = db
        .transaction(move |txn| {
            let future = f(txn);
            Box::pin(async move {
                let result = future.await;
                debug!(transaction_id = %transaction_id, "Transaction body completed");
                result
            })
        })
        .await;

    let elapsed = start.elapsed();
    histogram!("turbine_db.transaction.duration", elapsed, "operation" => operation);

    match &result {
        Ok(_) => {
            counter!("turbine_db.transaction.committed", 1, "operation" => operation);
            debug!(transaction_id = %transaction_id, operation, "Transaction committed in {:?}", elapsed);
        }
        Err(e) => {
            counter!("turbine_db.transaction.rolled_back", 1, "operation" => operation);
            warn!(transaction_id = %transaction_id, operation, error = %e, "Transaction rolled back after {:?}", elapsed);
        }
    }

    result.map_err(|e| match e {
        sea_orm::TransactionError::Connection(e) => ServiceError::DatabaseError(e),
        sea_orm::TransactionError::Transaction(e) => e,
    })
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(AppError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

pub async fn check_connection(pool: &DbPool) -> Result<(), AppError> {
    debug!("Checking database connection");
    let start = Instant::now();

    let result = pool.ping().await.map_err(AppError::DatabaseError);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("turbine_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!(
                "Database connection check failed after {:?}: {}",
                elapsed, e
            );
            counter!("turbine_db.connection_failures", 1);
        }
    }

    result
}

pub async fn close_pool(pool: DbPool) -> Result<(), AppError> {
    info!("Closing database connection pool");

    pool.close().await.map_err(AppError::DatabaseError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectionTrait, Statement};

    async fn memory_pool() -> DbPool {
        let config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            sqlx_logging: false,
            ..Default::default()
        };
        establish_connection_with_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn migrations_apply_and_connection_checks_out() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn closing_a_clone_closes_the_shared_pool() {
        let pool = memory_pool().await;
        let held_elsewhere = pool.clone();

        close_pool(pool).await.unwrap();

        assert!(check_connection(&held_elsewhere).await.is_err());
    }

    #[tokio::test]
    async fn failed_body_rolls_back() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let result: Result<(), ServiceError> = transaction(&pool, "test", |txn| {
            Box::pin(async move {
                txn.execute(Statement::from_string(
                    txn.get_database_backend(),
                    "INSERT INTO turbine_watermarks (turbine_id, updated_at) VALUES (1, '2023-01-01T00:00:00+00:00')",
                ))
                .await?;
                Err(ServiceError::InternalError("abort".into()))
            })
        })
        .await;
        assert!(result.is_err());

        let row = pool
            .query_one(Statement::from_string(
                pool.get_database_backend(),
                "SELECT COUNT(*) AS n FROM turbine_watermarks",
            ))
            .await
            .unwrap()
            .unwrap();
        let count: i64 = row.try_get("", "n").unwrap();
        assert_eq!(count, 0);
    }
}
