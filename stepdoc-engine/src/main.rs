//! stepdoc-engine - Step Document Engine service
//!
//! Hosts the step document store behind an HTTP/SSE API: save/submit/
//! withdraw operations, cross-step reference reads, and the per-project
//! change feed connected editors subscribe to.

use anyhow::Result;
use clap::Parser;
use stepdoc_common::config::{prepare_root_folder, resolve_root_folder};
use stepdoc_common::db::{init_database, setting_i64};
use stepdoc_engine::{build_router, AppState};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stepdoc-engine", about = "Step document engine service")]
struct Cli {
    /// Root folder holding the database (overrides env and config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// HTTP port (overrides the stored setting)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init for instant
    // startup feedback before database delays
    info!(
        "Starting Step Document Engine (stepdoc-engine) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), "STEPDOC_ROOT")?;
    let db_path = prepare_root_folder(&root_folder)?;
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let event_capacity = setting_i64(&pool, "event_channel_capacity", 256).await? as usize;
    let port = match cli.port {
        Some(port) => port,
        None => setting_i64(&pool, "http_port", 5740).await? as u16,
    };

    let state = AppState::new(pool, event_capacity);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    info!("stepdoc-engine listening on http://127.0.0.1:{}", port);
    info!("Health check: http://127.0.0.1:{}/health", port);

    axum::serve(listener, app).await?;

    Ok(())
}
