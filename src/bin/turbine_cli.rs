use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use turbine_telemetry::{
    config::{self, AppConfig},
    db::{self, DbPool},
    entities::{anomaly, computed_window, turbine_watermark},
    services::{AggregationOutcome, PipelineService, RunReport, SweepReport},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Run => handle_run(&context, cli.json).await?,
        Commands::Aggregate { turbine } => handle_aggregate(&context, turbine, cli.json).await?,
        Commands::Sweep => handle_sweep(&context, cli.json).await?,
        Commands::Anomalies { turbine, limit } => {
            handle_anomalies(&context, turbine, limit, cli.json).await?
        }
        Commands::Windows { turbine, limit } => {
            handle_windows(&context, turbine, limit, cli.json).await?
        }
        Commands::Watermarks => handle_watermarks(&context, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "turbine-cli",
    about = "Run and inspect the turbine telemetry pipeline",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest pending batch files, aggregate and sweep once
    Run,
    /// Compute every complete window of one turbine up to its ingestion watermark
    Aggregate {
        #[arg(long)]
        turbine: i32,
    },
    /// Delete raw rows already covered by committed windows
    Sweep,
    /// List detected anomalies, newest first
    Anomalies {
        #[arg(long)]
        turbine: Option<i32>,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// List computed windows of one turbine, newest first
    Windows {
        #[arg(long)]
        turbine: i32,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Show the watermark ledger
    Watermarks,
}

struct CliContext {
    _config: AppConfig,
    _db: Arc<DbPool>,
    pipeline: PipelineService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }
        let db = Arc::new(db_pool);
        let pipeline = PipelineService::with_csv_directory(db.clone(), config.pipeline.clone());

        Ok(Self {
            _config: config,
            _db: db,
            pipeline,
        })
    }
}

async fn handle_run(context: &CliContext, json: bool) -> Result<()> {
    let report = context
        .pipeline
        .run_with_timeout()
        .await
        .context("pipeline run failed")?;

    if json {
        print_json(&report)?;
    } else {
        render_report(&report);
    }
    Ok(())
}

async fn handle_aggregate(context: &CliContext, turbine: i32, json: bool) -> Result<()> {
    let outcome = context
        .pipeline
        .aggregation()
        .aggregate_turbine(turbine, None)
        .await;

    if json {
        print_json(&outcome)?;
    } else {
        render_aggregation(&outcome);
    }
    Ok(())
}

async fn handle_sweep(context: &CliContext, json: bool) -> Result<()> {
    let report = context
        .pipeline
        .retention()
        .sweep_pending()
        .await
        .context("retention sweep failed")?;

    if json {
        print_json(&report)?;
    } else {
        render_sweep(&report);
    }
    Ok(())
}

async fn handle_anomalies(
    context: &CliContext,
    turbine: Option<i32>,
    limit: u64,
    json: bool,
) -> Result<()> {
    let repo = &context.pipeline.repositories().anomalies;
    let mut anomalies = match turbine {
        Some(turbine_id) => repo.find_for_turbine(turbine_id).await?,
        None => repo.find_all(Some(limit)).await?,
    };
    anomalies.truncate(limit as usize);

    if json {
        print_json(&anomalies)?;
    } else if anomalies.is_empty() {
        println!("No anomalies recorded");
    } else {
        anomalies.iter().for_each(render_anomaly);
    }
    Ok(())
}

async fn handle_windows(context: &CliContext, turbine: i32, limit: u64, json: bool) -> Result<()> {
    let windows = context
        .pipeline
        .repositories()
        .windows
        .find_for_turbine(turbine, Some(limit))
        .await?;

    if json {
        print_json(&windows)?;
    } else if windows.is_empty() {
        println!("No windows computed for turbine {}", turbine);
    } else {
        windows.iter().for_each(render_window);
    }
    Ok(())
}

async fn handle_watermarks(context: &CliContext, json: bool) -> Result<()> {
    let ledger = context.pipeline.repositories().watermarks.find_all().await?;

    if json {
        print_json(&ledger)?;
    } else if ledger.is_empty() {
        println!("No turbines ingested yet");
    } else {
        ledger.iter().for_each(render_watermark);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_report(report: &RunReport) {
    println!(
        "Run {} • {} file(s), {} ingested, {} removed",
        report.run_id, report.files_found, report.files_ingested, report.files_removed
    );
    println!(
        "  rows: {} read, {} rejected, {} filtered, {} stale, {} inserted",
        report.rows_read,
        report.rows_rejected,
        report.rows_filtered,
        report.rows_stale,
        report.rows_inserted
    );
    println!(
        "  {} window(s), {} anomalies, {} raw row(s) swept",
        report.windows.len(),
        report.anomalies_detected,
        report.rows_swept
    );
    for issue in &report.issues {
        println!("  ! {:?} {}: {}", issue.stage, issue.subject, issue.message);
    }
}

fn render_aggregation(outcome: &AggregationOutcome) {
    println!(
        "Turbine {} • {} window(s), {} anomalies",
        outcome.turbine_id,
        outcome.windows.len(),
        outcome.anomalies()
    );
    for window in &outcome.windows {
        println!(
            "- {} → {} • {} sample(s) • {} anomalies",
            window.window_start, window.window_end, window.sample_count, window.anomalies
        );
    }
    if let Some(error) = &outcome.error {
        println!("  ! stopped: {}", error);
    }
}

fn render_sweep(report: &SweepReport) {
    println!("Swept {} raw row(s)", report.deleted());
    for sweep in &report.swept {
        if let Some(through) = sweep.through {
            println!(
                "- turbine {} • {} row(s) through {}",
                sweep.turbine_id, sweep.deleted, through
            );
        }
    }
    for failure in &report.failures {
        println!("  ! turbine {}: {}", failure.turbine_id, failure.error);
    }
}

fn render_anomaly(anomaly: &anomaly::Model) {
    println!(
        "- turbine {} • {} • power {:.2} • deviation {:.2}",
        anomaly.turbine_id, anomaly.timestamp, anomaly.power_output, anomaly.output_deviation
    );
}

fn render_window(window: &computed_window::Model) {
    let mean = window
        .mean_power
        .map_or_else(|| "n/a".to_string(), |m| format!("{:.2}", m));
    println!(
        "- {} → {} • {} sample(s) • mean {}",
        window.window_start, window.window_end, window.sample_count, mean
    );
}

fn render_watermark(ledger: &turbine_watermark::Model) {
    let show = |at: Option<chrono::DateTime<chrono::Utc>>| {
        at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
    };
    println!(
        "- turbine {} • ingested {} • computed {} • swept {}",
        ledger.turbine_id,
        show(ledger.last_ingested_at),
        show(ledger.last_computed_at),
        show(ledger.last_swept_at)
    );
}
