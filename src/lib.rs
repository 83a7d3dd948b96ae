//! Turbine telemetry pipeline
//!
//! Ingests CSV batches of wind turbine readings, deduplicates them against a
//! per-turbine watermark ledger, aggregates fixed-size windows and flags
//! power readings outside two standard deviations of their window mean.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod services;
pub mod source;

use axum::{http::Method, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::services::PipelineService;

/// Shared state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub pipeline: Arc<PipelineService>,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        let pipeline = Arc::new(PipelineService::with_csv_directory(
            db.clone(),
            config.pipeline.clone(),
        ));
        Self {
            db,
            config,
            pipeline,
        }
    }
}

/// Router with tracing, CORS and a request timeout covering one pipeline run
pub fn app(state: Arc<AppState>) -> Router {
    let request_timeout = state.config.pipeline.run_timeout() + Duration::from_secs(5);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    handlers::router(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
