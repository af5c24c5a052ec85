//! Video annotation server.
//!
//! Serves the annotation API over the videos in the configured source
//! directory, extracting frames through ffmpeg on demand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use frame_sampler::Ffmpeg;
use shared::{Config, Database, SharedStore, VideoStore, WorkspacePaths};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

mod error;
mod handlers;
mod router;
mod state;

use state::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Fold legacy versioned label files into one file per video
    MigrateLabels,

    /// Write a configuration file with default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(Command::InitConfig { force }) = args.command {
        if args.config.exists() && !force {
            anyhow::bail!(
                "{} already exists, pass --force to overwrite",
                args.config.display()
            );
        }
        Config::default().save(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    shared::logging::init(shared::LogConfig::from_config(
        &config,
        "annotation-server",
        args.verbose,
    ))?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    let paths = WorkspacePaths::new(config.source_dir(), config.output_dir());
    paths
        .create_dirs()
        .context("Failed to create video directories")?;
    info!(
        source_dir = %paths.source_dir().display(),
        output_dir = %paths.output_dir().display(),
        "Video directories ready"
    );

    // Initialize database
    let db_path = config.database_path();
    info!(db_path = %db_path.display(), "Opening database");
    let database = Database::open(&db_path).context("Failed to open database")?;
    let store = SharedStore::new(VideoStore::new(database));

    let counts = store
        .with(|s| s.count_by_state())
        .context("Failed to count videos")?;
    for (state, count) in counts {
        info!(state = %state, count, "Stored videos");
    }

    let transcoder = Arc::new(Ffmpeg::new(config.preprocess.extraction_timeout_seconds));
    let state = AppState::new(&config, store, paths, transcoder);

    match args.command.unwrap_or(Command::Serve) {
        Command::MigrateLabels => {
            let report = state.labels.consolidate_legacy().await?;
            info!(
                consolidated = report.consolidated.len(),
                removed = report.removed,
                unknown = report.unknown.len(),
                "Label migration complete"
            );
            Ok(())
        }
        Command::Serve | Command::InitConfig { .. } => serve(&config, state).await,
    }
}

async fn serve(config: &Config, state: AppState) -> Result<()> {
    // No run survives a restart; sweep what the previous process left behind
    let report = state
        .preprocessor
        .recover(config.preprocess.resume_interrupted)
        .context("Failed to recover interrupted preprocessing")?;
    if report.interrupted.is_empty() {
        info!("No interrupted preprocessing");
    }

    let app = router::build_app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Annotation server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Annotation server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
