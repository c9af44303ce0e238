//! csvshelf-server - CSV upload service
//!
//! Accepts CSV uploads over HTTP, parses them and stores the rows in SQLite.
//! Records can be listed, displayed and deleted through the JSON API or the
//! bundled web page.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use csvshelf_common::config::{
    CompiledDefaults, ResolvedSettings, RootFolderInitializer, RootFolderResolver,
};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use csvshelf_server::db::{RecordStore, SqliteRecordStore};
use csvshelf_server::services::{TempStorage, UploadPipeline};
use csvshelf_server::{build_router, AppState};

/// Command-line arguments for csvshelf-server
#[derive(Parser, Debug)]
#[command(name = "csvshelf-server")]
#[command(about = "CSV upload and storage service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and upload directory
    #[arg(short, long, env = "CSVSHELF_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "CSVSHELF_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CSVSHELF_PORT")]
    port: Option<u16>,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "CSVSHELF_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // TOML is read before tracing starts so its log level can seed the filter;
    // a load error is held and logged once the subscriber is installed
    let resolver = RootFolderResolver::new("server");
    let (file_config, config_error) = match resolver.read_config() {
        Ok(config) => (config, None),
        Err(e) => (None, Some(e)),
    };
    let settings = ResolvedSettings::from_layers(
        &CompiledDefaults::for_current_platform(),
        file_config.as_ref(),
    );

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting csvshelf-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(e) = config_error {
        warn!(
            "Ignoring config file {}: {}",
            resolver.display_config_path(),
            e
        );
    }

    let root_folder = args
        .root_folder
        .unwrap_or_else(|| resolver.resolve_with_config(file_config.as_ref()));
    let host = args.host.unwrap_or(settings.host);
    let port = args.port.unwrap_or(settings.port);
    let max_upload_bytes = args.max_upload_bytes.unwrap_or(settings.max_upload_bytes);

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = match csvshelf_common::db::init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteRecordStore::new(pool).with_lock_wait_ms(settings.lock_wait_ms));

    let storage = TempStorage::new(initializer.upload_dir(), max_upload_bytes);
    storage
        .sweep_stale()
        .await
        .context("Failed to prepare upload directory")?;
    info!(
        "Upload directory: {} (limit {} bytes)",
        storage.dir().display(),
        max_upload_bytes
    );

    let pipeline = UploadPipeline::new(storage, store.clone());
    let app = build_router(AppState::new(store, pipeline));

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
