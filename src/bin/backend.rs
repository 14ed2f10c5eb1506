#![forbid(unsafe_code)]

//! HTTP server for the video catalog.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use video_catalog::{
    api::{self, AppState},
    config::{self, StoreKind},
    memory::MemoryVideoStore,
    repository::VideoRepository,
    sqlite::SqliteVideoStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the video catalog API.")]
struct Cli {
    #[arg(
        long = "config",
        value_name = "PATH",
        help = "KEY=VALUE settings file (default /etc/video-catalog-env if present)"
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "db",
        value_name = "PATH",
        help = "Override the SQLite database path"
    )]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut settings =
        config::load_service_config(cli.config.as_deref()).context("loading configuration")?;
    if let Some(db) = cli.db {
        settings.database_path = db;
    }

    let repo: Arc<dyn VideoRepository> = match settings.store {
        StoreKind::Sqlite => {
            let path = settings.database_path.clone();
            let pool = settings.pool.clone();
            let store = tokio::task::spawn_blocking(move || SqliteVideoStore::open(&path, &pool))
                .await
                .context("opening video database")?
                .with_context(|| {
                    format!(
                        "opening video database {}",
                        settings.database_path.display()
                    )
                })?;
            Arc::new(store)
        }
        StoreKind::Memory => {
            info!("using in-memory store; data is lost on shutdown");
            Arc::new(MemoryVideoStore::new())
        }
    };

    let app = api::app(AppState::new(repo), settings.request_timeout);

    let listener = tokio::net::TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("binding to {}:{}", settings.host, settings.port))?;
    info!(
        addr = %listener.local_addr()?,
        store = %settings.store,
        "video catalog listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", err);
    }
}
