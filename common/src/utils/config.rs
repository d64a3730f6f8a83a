use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Floor for the derived job-queue capacity.
const QUEUE_CAPACITY_FLOOR: usize = 100;

/// Application configuration loaded from files and environment variables.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    /// Postgres connection string for the embeddings store.
    pub storage_dsn: String,
    /// API keys for the embedding provider. Embedding is disabled when empty.
    #[serde(default)]
    pub embedder_api_keys: Vec<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_worker_count() -> usize {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl AppConfig {
    /// Capacity of each bounded job queue: `worker_count * batch_size`,
    /// never below the floor of 100.
    pub fn queue_capacity(&self) -> usize {
        (self.worker_count * self.batch_size).max(QUEUE_CAPACITY_FLOOR)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dsn: String::new(),
            embedder_api_keys: Vec::new(),
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Loads the application configuration from the environment and optional config file.
#[allow(clippy::module_name_repetitions)]
pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
