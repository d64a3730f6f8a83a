pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppError;
use crate::types::DataSourceStatus;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Deadline for one transactional embedding batch insert.
pub const INSERT_DEADLINE: Duration = Duration::from_secs(10);
/// Deadline for one datasource status update statement.
pub const STATUS_UPDATE_DEADLINE: Duration = Duration::from_secs(30);

/// One row destined for the `Embeddings` table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRow {
    pub text: String,
    pub vector: Vec<f64>,
    pub datasource_id: Option<i64>,
    pub citation: Option<String>,
}

/// Persistence capability used by the pipeline.
///
/// Implementations must be safe for concurrent use; batch inserts are
/// all-or-nothing per call so a retried embedding job never leaves a
/// partially written batch behind.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn batch_insert_embeddings(
        &self,
        user_id: &str,
        chatbot_id: &str,
        rows: Vec<EmbeddingRow>,
    ) -> Result<(), AppError>;

    /// Sets `status` and bumps `updatedAt` for all listed datasources in a
    /// single statement.
    async fn update_datasource_status(
        &self,
        datasource_ids: &[i64],
        status: DataSourceStatus,
    ) -> Result<(), AppError>;
}
