//! Capture Worker
//!
//! This binary claims pending captures from Postgres one at a time, runs the
//! archiving engine against them and reports the outcome.

use std::sync::Arc;

use anyhow::{Context, Result};
use capture_core::domains::captures::CaptureWorker;
use capture_core::kernel::{PostgresCaptureStore, WorkerDeps};
use capture_core::Config;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "capture-worker")]
#[command(about = "Single-worker capture job processor")]
struct Cli {
    /// Proxy port to start hunting from (overrides PROXY_PORT)
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Run a single cycle, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,capture_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(port) = cli.proxy_port {
        config.capture.proxy_port = port;
        config.capture.validate()?;
    }

    tracing::info!("starting capture worker");

    tokio::fs::create_dir_all(&config.capture.temporary_storage_path)
        .await
        .with_context(|| {
            format!(
                "Failed to create storage folder {}",
                config.capture.temporary_storage_path.display()
            )
        })?;

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let store = Arc::new(PostgresCaptureStore::new(pool));
    let deps = WorkerDeps::from_config(&config.capture, store, http)?;
    let worker = CaptureWorker::new(config.capture, deps);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    if cli.once {
        let outcome = worker.run_once(&shutdown).await;
        tracing::info!(?outcome, "cycle finished");
        return Ok(());
    }

    worker.run(shutdown).await
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
