use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contourd::queue::RedisBackend;
use contourd::{config::Config, AppState};

#[derive(Parser, Debug)]
#[command(name = "contourd", about = "Background image contour-detection server")]
struct Args {
    /// Path to an alternate .env file.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)?;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contourd=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    // The upload and result directories must exist before serving; the
    // result dir is also mounted for static file serving.
    tokio::fs::create_dir_all(&config.storage.upload_dir).await?;
    tokio::fs::create_dir_all(&config.storage.result_dir).await?;

    // The backend dials lazily; a dead broker degrades requests to
    // synchronous processing instead of failing startup.
    let queue = Arc::new(RedisBackend::new(config.redis.clone())?);

    let state = AppState::new(config.clone(), queue);
    let app = contourd::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
