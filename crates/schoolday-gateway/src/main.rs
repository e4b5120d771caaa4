use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use schoolday_core::config::SchooldayConfig;
use schoolday_gateway::app::{self, AppState};
use schoolday_history::{ArchiveMode, ArchiveOutcome, NightlyArchiver};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Parser)]
#[command(name = "schoolday-gateway", version, about = "Live school schedule sync and archival")]
struct Cli {
    /// Config file (default: $SCHOOLDAY_CONFIG, then ~/.schoolday/schoolday.toml).
    #[arg(long, short, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway and the nightly archiver (default).
    Serve,
    /// Archive one date and print the outcome as JSON.
    Archive {
        /// Date to archive (default: today).
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Include schools that did not publish the date.
        #[arg(long)]
        force: bool,
    },
    /// Archive every date from the earliest live schedule row.
    Backfill {
        /// Last date to archive (default: yesterday).
        #[arg(long)]
        until: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schoolday_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SchooldayConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        SchooldayConfig::default()
    });

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(&db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

    // every subsystem shares this connection; schema setup is idempotent
    let state = Arc::new(AppState::new(config, Arc::new(Mutex::new(db)))?);
    info!("database migrations complete");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Archive { date, force } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let mode = if force {
                ArchiveMode::Force
            } else {
                ArchiveMode::Nightly
            };
            report(state.archive.archive_date(date, mode).await)
        }
        Command::Backfill { until } => {
            let until = until.unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive());
            let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping after the current date");
                    let _ = stop_tx.send(true);
                }
            });
            report(state.archive.backfill(until, Some(&stop_rx)).await)
        }
    }
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if state.config.archive.nightly_enabled {
        let nightly = NightlyArchiver::new(state.archive.clone(), &state.config.archive);
        tokio::spawn(async move { nightly.run(shutdown_rx).await });
    }

    let addr: SocketAddr = format!("{}:{}", state.config.gateway.bind, state.config.gateway.port).parse()?;
    let router = app::build_router(state);
    info!("Schoolday gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // signal the nightly archiver to stop
    let _ = shutdown_tx.send(true);
    Ok(())
}

fn report(outcome: ArchiveOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        anyhow::bail!("{}", outcome.message);
    }
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
