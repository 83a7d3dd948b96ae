use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use tracing::info;
use turbine_telemetry::{config, db, migrator::Migrator};

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back the telemetry schema", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending migrations (default)
    Up,
    /// Roll back the given number of migrations, all of them when omitted
    Down {
        #[arg(long)]
        steps: Option<u32>,
    },
    /// List applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match cli.command.unwrap_or(Command::Up) {
        Command::Up => db::run_migrations(&db).await?,
        Command::Down { steps } => {
            info!(?steps, "Rolling back migrations");
            Migrator::down(&db, steps)
                .await
                .context("migration rollback failed")?;
        }
        Command::Status => Migrator::status(&db)
            .await
            .context("cannot read migration status")?,
    }

    db::close_pool(db).await?;
    info!("Migration command completed successfully");
    Ok(())
}
