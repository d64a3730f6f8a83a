use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::AppError;
use crate::types::DataSourceStatus;

use super::{EmbeddingRow, Storage, INSERT_DEADLINE, STATUS_UPDATE_DEADLINE};

/// Postgres-backed storage gateway.
///
/// The schema is shared with the serving side of the platform, hence the
/// quoted camel-case identifiers. Vectors live in a pgvector
/// `vector(768)` column.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(dsn: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(dsn).await?;
        info!("Connected to embeddings store");
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn batch_insert_embeddings(
        &self,
        user_id: &str,
        chatbot_id: &str,
        rows: Vec<EmbeddingRow>,
    ) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let row_count = rows.len();
        let insert = async {
            let mut tx = self.pool.begin().await?;
            let now = Utc::now();

            for row in rows {
                let vector = Vector::from(
                    row.vector.iter().map(|v| *v as f32).collect::<Vec<f32>>(),
                );
                sqlx::query(
                    r#"INSERT INTO "Embeddings"
                       ("userId", "chatbotId", "dataSourceId", "citation", "text", "vector", "createdAt")
                       VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                )
                .bind(user_id)
                .bind(chatbot_id)
                .bind(row.datasource_id)
                .bind(row.citation)
                .bind(row.text)
                .bind(vector)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok::<(), AppError>(())
        };

        timeout(INSERT_DEADLINE, insert)
            .await
            .map_err(|_| AppError::Persist("embedding batch insert timed out".into()))??;

        debug!(rows = row_count, chatbot_id, "Inserted embedding batch");
        Ok(())
    }

    async fn update_datasource_status(
        &self,
        datasource_ids: &[i64],
        status: DataSourceStatus,
    ) -> Result<(), AppError> {
        if datasource_ids.is_empty() {
            return Ok(());
        }

        let update = sqlx::query(
            r#"UPDATE "DataSource" SET "status" = $1, "updatedAt" = $2 WHERE "id" = ANY($3)"#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(datasource_ids)
        .execute(&self.pool);

        timeout(STATUS_UPDATE_DEADLINE, update)
            .await
            .map_err(|_| AppError::StatusUpdate("datasource status update timed out".into()))??;

        debug!(
            datasources = datasource_ids.len(),
            status = %status,
            "Updated datasource status"
        );
        Ok(())
    }
}
