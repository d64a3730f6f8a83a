use std::sync::Arc;
use std::time::Duration;

use common::storage::{PgStorage, Storage};
use common::utils::config::get_config;
use ingestion_pipeline::embedder::{Embedder, GeminiEmbedder};
use ingestion_pipeline::{IngestionPipeline, WorkerPool};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let storage: Arc<dyn Storage> = Arc::new(PgStorage::connect(&config.storage_dsn).await?);

    let embedder: Option<Arc<dyn Embedder>> = if config.embedder_api_keys.is_empty() {
        warn!("No embedder API keys configured; embedding generation is disabled");
        None
    } else {
        Some(Arc::new(GeminiEmbedder::new(
            config.embedder_api_keys.clone(),
        )?))
    };

    let pool = Arc::new(WorkerPool::new(
        config.worker_count,
        config.queue_capacity(),
        embedder,
        storage.clone(),
    ));

    let pipeline = Arc::new(IngestionPipeline::new(
        storage,
        pool.clone(),
        config.chunk_size,
        config.chunk_overlap,
    ));

    pool.start(pipeline);
    info!(
        workers = config.worker_count,
        queue_capacity = config.queue_capacity(),
        "Ingestion workers started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers");
    pool.stop(Duration::from_secs(30)).await;

    Ok(())
}
