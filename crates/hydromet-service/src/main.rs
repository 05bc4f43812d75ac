//! Hydromet Service - claim scheduler and sync trigger API.
//!
//! Run with: `cargo run -p hydromet-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use hydromet_service::{AppState, Config, Scheduler, api};
use hydromet_source::HttpSource;
use hydromet_store::Store;

/// Hydromet Service - claim scheduler and sync trigger API.
#[derive(Parser, Debug)]
#[command(name = "hydromet-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Measurement service base URL (overrides config).
    #[arg(short, long)]
    source_url: Option<String>,

    /// Disable the claim scheduler (trigger API only mode).
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hydromet_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(source_url) = args.source_url {
        config.source.base_url = source_url;
    }
    config.validate()?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Build the remote source client
    let source = HttpSource::new(
        config.source.base_url.clone(),
        Some(config.source.request_timeout()),
    )?;

    // Create application state
    let state = AppState::new(store, Arc::new(source), config.clone());

    // Start the claim scheduler
    if !args.no_scheduler {
        let scheduler = Scheduler::new(Arc::clone(&state));
        scheduler.start();
    } else {
        info!("Claim scheduler disabled");
    }

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    // Run the server; ctrl-c stops the scheduler loop before the listener
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down by interrupt");
        state.scheduler.signal_stop();
    }
}
