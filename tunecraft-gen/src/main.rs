//! tunecraft-gen - Generation Status service
//!
//! Keeps persisted song records consistent with the asynchronous generation
//! jobs running at the external music provider, and serves the converged
//! status to the web layer.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tunecraft_common::config::{database_path, ensure_root_folder, resolve_root_folder};
use tunecraft_common::db::init_database;
use tunecraft_gen::services::cache::{spawn_cache_sweeper, StatusCaches};
use tunecraft_gen::services::reconciler::StatusReconciler;
use tunecraft_gen::services::song_store::SongStore;
use tunecraft_gen::services::suno_client::SunoClient;
use tunecraft_gen::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "tunecraft-gen", about = "tunecraft generation status service")]
struct Args {
    /// Root data folder (overrides TUNECRAFT_ROOT and the config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5740)]
    port: u16,

    /// API key for the Suno gateway
    #[arg(long, env = "SUNO_API_KEY", hide_env_values = true)]
    suno_api_key: String,

    /// Override the gateway base URL (self-hosted proxies, testing)
    #[arg(long, env = "SUNO_API_BASE_URL")]
    suno_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting tunecraft Generation Status service (tunecraft-gen) v{}",
        env!("CARGO_PKG_VERSION")
    );

    let args = Args::parse();

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    ensure_root_folder(&root_folder)?;

    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    let provider = match &args.suno_base_url {
        Some(base_url) => SunoClient::with_base_url(args.suno_api_key.clone(), base_url.clone()),
        None => SunoClient::new(args.suno_api_key.clone()),
    }
    .context("Failed to create generation provider client")?;

    let caches = Arc::new(StatusCaches::new());
    let shutdown = CancellationToken::new();
    spawn_cache_sweeper(Arc::clone(&caches), shutdown.clone());

    let reconciler = Arc::new(StatusReconciler::new(
        SongStore::new(pool),
        Arc::new(provider),
        caches,
    ));

    let app = build_router(AppState::new(reconciler));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port))
        .await
        .with_context(|| format!("Failed to bind port {}", args.port))?;
    info!("tunecraft-gen listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    shutdown.cancel();
    Ok(())
}
