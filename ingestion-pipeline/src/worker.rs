use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::storage::{EmbeddingRow, Storage};
use common::types::{ContentChunk, DataSourceStatus};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::embedder::Embedder;
use crate::pool::{EmbeddingJob, EmbeddingQueue, MAX_EMBEDDING_RETRIES};

/// Whole-job deadline: embed calls started past this point fail straight
/// into the retry path instead of running forever.
const EMBEDDING_JOB_DEADLINE: Duration = Duration::from_secs(300);
const PROGRESS_LOG_INTERVAL: usize = 10;

/// Processes one `EmbeddingJob`: embed every chunk, persist the batch,
/// settle the datasource status, and route failures into the bounded
/// retry path.
pub struct EmbeddingWorker {
    embedder: Option<Arc<dyn Embedder>>,
    storage: Arc<dyn Storage>,
    retry_queue: EmbeddingQueue,
}

impl EmbeddingWorker {
    pub fn new(
        embedder: Option<Arc<dyn Embedder>>,
        storage: Arc<dyn Storage>,
        retry_queue: EmbeddingQueue,
    ) -> Self {
        Self {
            embedder,
            storage,
            retry_queue,
        }
    }

    pub async fn process(&self, worker_id: usize, job: EmbeddingJob) {
        let start = Instant::now();
        info!(
            worker_id,
            job_id = %job.job_id,
            chatbot_id = %job.chatbot_id,
            chunks = job.chunks.len(),
            retry_count = job.retry_count,
            "Processing embedding job"
        );

        let Some(embedder) = self.embedder.clone() else {
            warn!(
                worker_id,
                job_id = %job.job_id,
                "Embedder not configured, skipping embedding generation"
            );
            return;
        };

        // Kept aside so a persist failure can requeue the whole set
        // without splitting successes from failures downstream.
        let original_chunks = job.chunks.clone();

        let deadline = start + EMBEDDING_JOB_DEADLINE;
        let mut successful: Vec<ContentChunk> = Vec::new();
        let mut failed: Vec<ContentChunk> = Vec::new();
        let total = job.chunks.len();

        for mut chunk in job.chunks.clone() {
            if Instant::now() >= deadline {
                warn!(
                    worker_id,
                    job_id = %job.job_id,
                    chunk_index = chunk.chunk_index,
                    "Embedding job deadline exceeded, failing remaining chunk"
                );
                failed.push(chunk);
                continue;
            }

            match embedder.embed(&chunk.content).await {
                Ok(embedding) => {
                    debug!(
                        worker_id,
                        job_id = %job.job_id,
                        chunk_index = chunk.chunk_index,
                        dimensions = embedding.len(),
                        "Embedding generated"
                    );
                    chunk.embedding = Some(embedding);
                    successful.push(chunk);
                }
                Err(e) => {
                    error!(
                        worker_id,
                        job_id = %job.job_id,
                        chunk_index = chunk.chunk_index,
                        error = %e,
                        "Failed to generate embedding"
                    );
                    failed.push(chunk);
                }
            }

            let processed = successful.len() + failed.len();
            if processed % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    worker_id,
                    job_id = %job.job_id,
                    processed,
                    total,
                    "Embedding progress"
                );
            }
        }

        info!(
            worker_id,
            job_id = %job.job_id,
            chatbot_id = %job.chatbot_id,
            successful = successful.len(),
            failed = failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Completed embedding generation"
        );

        if !successful.is_empty() {
            // Only mark COMPLETED when no chunk is still owed a retry.
            let mark_completed = failed.is_empty();

            if let Err(e) = self
                .persist_embeddings(&job, &successful, mark_completed)
                .await
            {
                error!(
                    worker_id,
                    job_id = %job.job_id,
                    error = %e,
                    "Failed to persist embeddings, requeueing entire job"
                );
                self.requeue_failed_chunks(worker_id, &job, original_chunks)
                    .await;
                return;
            }

            info!(
                worker_id,
                job_id = %job.job_id,
                embeddings = successful.len(),
                marked_completed = mark_completed,
                "Persisted embeddings"
            );
        }

        if !failed.is_empty() {
            self.requeue_failed_chunks(worker_id, &job, failed).await;
        }
    }

    async fn persist_embeddings(
        &self,
        job: &EmbeddingJob,
        chunks: &[ContentChunk],
        mark_completed: bool,
    ) -> Result<(), common::error::AppError> {
        let mut rows = Vec::with_capacity(chunks.len());
        let mut datasource_ids = BTreeSet::new();

        for chunk in chunks {
            let Some(embedding) = &chunk.embedding else {
                continue;
            };
            if embedding.is_empty() {
                continue;
            }

            let citation = chunk
                .metadata
                .get("citation")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let datasource_id = (chunk.datasource_id > 0).then_some(chunk.datasource_id);
            if let Some(id) = datasource_id {
                datasource_ids.insert(id);
            }

            rows.push(EmbeddingRow {
                text: chunk.content.clone(),
                vector: embedding.clone(),
                datasource_id,
                citation,
            });
        }

        if rows.is_empty() {
            return Ok(());
        }

        self.storage
            .batch_insert_embeddings(&job.user_id, &job.chatbot_id, rows)
            .await?;

        if mark_completed && !datasource_ids.is_empty() {
            let ids: Vec<i64> = datasource_ids.into_iter().collect();
            self.storage
                .update_datasource_status(&ids, DataSourceStatus::Completed)
                .await
                .map_err(|e| {
                    error!(job_id = %job.job_id, error = %e, "Failed to update datasource status");
                    e
                })?;
            info!(
                job_id = %job.job_id,
                datasources = ids.len(),
                "Updated datasource status to COMPLETED"
            );
        }

        Ok(())
    }

    async fn requeue_failed_chunks(
        &self,
        worker_id: usize,
        job: &EmbeddingJob,
        failed_chunks: Vec<ContentChunk>,
    ) {
        if job.retry_count >= MAX_EMBEDDING_RETRIES {
            error!(
                worker_id,
                job_id = %job.job_id,
                failed_chunks = failed_chunks.len(),
                retry_count = job.retry_count,
                "Max retries exceeded for embedding job, marking datasources as FAILED"
            );
            self.mark_datasources_failed(&job.job_id, &failed_chunks)
                .await;
            return;
        }

        let retry_job = job.retry_with(failed_chunks);
        let retry_id = retry_job.job_id.clone();
        let retry_count = retry_job.retry_count;
        let chunk_count = retry_job.chunks.len();

        // Chunks move into the retry job, so snapshot ids first in case
        // the queue refuses it.
        let failed_ids = distinct_datasource_ids(&retry_job.chunks);

        if self.retry_queue.try_enqueue(retry_job) {
            info!(
                worker_id,
                job_id = %retry_id,
                chunks = chunk_count,
                retry_count,
                "Requeued failed chunks for retry"
            );
        } else {
            error!(
                worker_id,
                job_id = %retry_id,
                chunks = chunk_count,
                "Failed to requeue embedding job (queue full), marking datasources as FAILED"
            );
            self.set_failed_status(&retry_id, failed_ids).await;
        }
    }

    async fn mark_datasources_failed(&self, job_id: &str, chunks: &[ContentChunk]) {
        let ids = distinct_datasource_ids(chunks);
        self.set_failed_status(job_id, ids).await;
    }

    async fn set_failed_status(&self, job_id: &str, ids: Vec<i64>) {
        if ids.is_empty() {
            return;
        }
        match self
            .storage
            .update_datasource_status(&ids, DataSourceStatus::Failed)
            .await
        {
            Ok(()) => info!(
                job_id,
                datasources = ids.len(),
                "Marked datasources as FAILED"
            ),
            Err(e) => error!(
                job_id,
                error = %e,
                "Failed to update datasource status to FAILED"
            ),
        }
    }
}

fn distinct_datasource_ids(chunks: &[ContentChunk]) -> Vec<i64> {
    chunks
        .iter()
        .filter(|chunk| chunk.datasource_id > 0)
        .map(|chunk| chunk.datasource_id)
        .collect::<BTreeSet<i64>>()
        .into_iter()
        .collect()
}
