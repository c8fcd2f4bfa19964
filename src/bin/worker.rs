//! Background worker binary: drains the contour-detection job queue.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::FutureExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use contourd::config::Config;
use contourd::queue::worker::Worker;
use contourd::queue::RedisBackend;
use contourd::utils::with_retry;

#[derive(Parser, Debug)]
#[command(name = "contourd-worker", about = "Contour-detection queue worker")]
struct Args {
    /// Seconds each queue poll blocks before looping.
    #[arg(long, default_value_t = 5)]
    poll_timeout: u64,

    /// Attempts to reach the broker before giving up at startup.
    #[arg(long, default_value_t = 5)]
    connect_retries: u32,

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

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contourd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tokio::fs::create_dir_all(&config.storage.result_dir).await?;

    let backend = Arc::new(RedisBackend::new(config.redis.clone())?);

    // Unlike the server, a worker is useless without a broker: verify
    // connectivity up front, retrying while redis comes up.
    {
        use contourd::queue::JobQueue;
        let probe = Arc::clone(&backend);
        with_retry(
            move || {
                let probe = Arc::clone(&probe);
                async move { probe.ping_roundtrip().await }.boxed()
            },
            args.connect_retries,
        )
        .await
        .map_err(|e| anyhow::anyhow!("job backend unreachable: {}", e))?;
    }

    let worker = Arc::new(Worker::new(backend, config.storage.result_dir.clone()));
    info!(worker_id = %worker.id(), queue = %config.redis.queue_key, "worker starting");

    worker.run(args.poll_timeout).await
}
