use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use turbine_telemetry as telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = telemetry::config::load_config().context("failed to load configuration")?;
    telemetry::config::init_tracing(cfg.log_level(), cfg.log_json);
    telemetry::handlers::health::init_start_time();

    // Init DB
    let db_pool = telemetry::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        telemetry::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Compose shared app state
    let app_state = Arc::new(telemetry::AppState::new(db_arc.clone(), cfg.clone()));

    let scheduler = match cfg.pipeline.schedule_interval() {
        Some(period) => Some(telemetry::scheduler::spawn_periodic(
            app_state.pipeline.clone(),
            period,
        )),
        None => {
            info!("Pipeline scheduler disabled; runs only via /fetch or turbine-cli");
            None
        }
    };

    let app = telemetry::app(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!(
        data_path = %cfg.pipeline.data_path.display(),
        window_secs = cfg.pipeline.compute_time_window_secs,
        "turbine-telemetry listening on http://{}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = scheduler {
        handle.abort();
        // cancelled runs roll back when the task is dropped
        let _ = handle.await;
    }
    // clones share one sqlx pool, so closing any of them closes it
    telemetry::db::close_pool(db_arc.as_ref().clone()).await?;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
