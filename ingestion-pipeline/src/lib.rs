pub mod chunker;
pub mod decoders;
pub mod downloader;
pub mod embedder;
pub mod pipeline;
pub mod pool;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use pipeline::IngestionPipeline;
pub use pool::{EmbeddingJob, IngestionHandler, IngestionJob, WorkerPool};
