mod airtable;
mod config;
mod db;
mod errors;
mod models;
mod notify;
mod routes;
mod state;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::airtable::AirtableClient;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::notify::resend::ResendNotifier;
use crate::notify::{AlertNotifier, LogNotifier};
use crate::routes::build_router;
use crate::state::AppState;
use crate::sync::alert::AlertTrigger;
use crate::sync::fields::FieldMap;
use crate::sync::history::PgHistoryStore;
use crate::sync::orchestrator::SyncService;
use crate::sync::scheduler::{run_on_interval, SingleFlight};
use crate::sync::sink::PgInteractionSink;

#[derive(Parser)]
#[command(name = "interaction-sync", version, about = "Incremental Airtable to Postgres sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one sync pass and exit (non-zero on failure)
    Run,
    /// Run a pass now, then every SYNC_INTERVAL_SECS
    Schedule,
    /// Serve the HTTP trigger/history API
    Serve {
        /// Also run the interval scheduler in this process
        #[arg(long)]
        schedule: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting interaction-sync v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url, config.db_acquire_timeout_secs).await?;
    run_migrations(&db).await?;

    let fields = match &config.field_map_path {
        Some(path) => {
            info!("Loading field map from {}", path.display());
            FieldMap::from_file(path)?
        }
        None => FieldMap::default(),
    };

    let notifier: Arc<dyn AlertNotifier> = match config.resend() {
        Some(resend) => {
            info!("E-mail alerts enabled (recipient: {})", resend.to);
            Arc::new(ResendNotifier::new(resend)?)
        }
        None => {
            warn!("RESEND_API_KEY or EMAIL_ALERT_TO not set, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let sink = Arc::new(PgInteractionSink::new(db.clone()));
    let history = Arc::new(PgHistoryStore::new(db.clone()));
    let alerts = AlertTrigger::new(history.clone(), notifier, config.alert_failure_threshold);
    let source = Arc::new(AirtableClient::new(config.airtable())?);
    info!(
        "Airtable source: base {} table {}",
        config.airtable_base_id, config.airtable_table
    );

    let service = SyncService::new(
        source,
        sink.clone(),
        history.clone(),
        alerts,
        fields,
        config.batch_size,
    );
    let runner = SingleFlight::new(Arc::new(service));
    let interval = Duration::from_secs(config.sync_interval_secs);

    match cli.command {
        Command::Run => {
            let report = runner.trigger().await?;
            info!(
                "Sync finished: {} checked, {} synced, {} skipped",
                report.records_checked, report.records_synced, report.records_skipped
            );
        }
        Command::Schedule => {
            info!("Scheduler started, interval {}s", interval.as_secs());
            tokio::select! {
                _ = run_on_interval(runner, interval) => {}
                _ = shutdown_signal() => info!("Scheduler stopping"),
            }
        }
        Command::Serve { schedule } => {
            if schedule {
                info!("Scheduler started, interval {}s", interval.as_secs());
                tokio::spawn(run_on_interval(runner.clone(), interval));
            }

            let state = AppState {
                runner,
                history,
                sink,
            };
            let app = build_router(state)
                .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

            let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
            info!("Listening on {addr}");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
