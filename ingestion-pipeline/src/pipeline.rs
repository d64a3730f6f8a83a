use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use common::error::AppError;
use common::storage::Storage;
use common::types::{
    ContentChunk, DataSourceStatus, ProcessRequest, ProcessResponse, ProcessStatus, ProcessedContent,
    SourceOutcome, SourceResult, SourceType,
};
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::decoders::{Decoder, DecoderFactory};
use crate::downloader::FileDownloader;
use crate::pool::{EmbeddingJob, IngestionHandler, IngestionJob, WorkerPool};

/// Admission front door and fan-out orchestrator.
///
/// `process` validates and enqueues; workers later call back into
/// `process_ingestion_job`, which decodes every source in parallel and
/// dispatches one embedding job per touched datasource.
pub struct IngestionPipeline {
    storage: Arc<dyn Storage>,
    pool: Arc<WorkerPool>,
    downloader: FileDownloader,
    default_chunk_size: usize,
    default_chunk_overlap: usize,
}

impl IngestionPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        pool: Arc<WorkerPool>,
        default_chunk_size: usize,
        default_chunk_overlap: usize,
    ) -> Self {
        Self {
            storage,
            pool,
            downloader: FileDownloader::new(),
            default_chunk_size,
            default_chunk_overlap,
        }
    }

    /// Admits one request: shape checks, then a non-blocking enqueue.
    /// The response only acknowledges queueing; per-datasource truth is
    /// written asynchronously to the status column.
    pub fn process(&self, request: ProcessRequest) -> Result<ProcessResponse, AppError> {
        request.validate()?;

        let job_id = Uuid::new_v4().to_string();
        let total_sources = request.total_sources();

        info!(
            job_id = %job_id,
            user_id = %request.user_id,
            chatbot_id = %request.chatbot_id,
            websites = request.website_urls.len(),
            qanda = request.qanda_data.len(),
            documents = request.documents.len(),
            text_content = request.text_content.len(),
            "Enqueueing ingestion job"
        );

        let job = IngestionJob {
            job_id: job_id.clone(),
            request,
        };

        if !self.pool.enqueue_ingestion(job) {
            return Err(AppError::AdmissionRejected(
                "ingestion queue is full, try again later".into(),
            ));
        }

        Ok(ProcessResponse {
            job_id,
            status: ProcessStatus::Processing,
            message: "Job queued for processing".into(),
            total_sources,
            timestamp: Utc::now(),
        })
    }

    /// Runs the decode fan-out for one admitted job and dispatches
    /// embedding work. Per-source failures never abort the job.
    pub async fn process_ingestion_job(&self, job: IngestionJob) {
        let IngestionJob { job_id, request } = job;

        info!(
            job_id = %job_id,
            user_id = %request.user_id,
            chatbot_id = %request.chatbot_id,
            websites = request.website_urls.len(),
            qanda = request.qanda_data.len(),
            documents = request.documents.len(),
            text_content = request.text_content.len(),
            "Processing ingestion job"
        );

        let (results, all_chunks) = self.decode_all_sources(&job_id, &request).await;

        let successful = results
            .iter()
            .filter(|r| r.status == SourceOutcome::Success)
            .count();
        let failed = results.len() - successful;
        let total_chunks: usize = results.iter().map(|r| r.chunk_count).sum();

        let status = if failed == 0 {
            ProcessStatus::Completed
        } else if successful == 0 {
            ProcessStatus::Failed
        } else {
            ProcessStatus::Partial
        };

        if !all_chunks.is_empty() {
            // One embedding job per datasource keeps retries and status
            // writes independent between datasources.
            let mut by_datasource: HashMap<i64, Vec<ContentChunk>> = HashMap::new();
            for chunk in all_chunks {
                by_datasource
                    .entry(chunk.datasource_id)
                    .or_default()
                    .push(chunk);
            }

            let datasource_count = by_datasource.len();
            let mut enqueued_jobs = 0;
            let mut dropped_jobs = 0;

            for (datasource_id, chunks) in by_datasource {
                let embedding_job = EmbeddingJob {
                    job_id: format!("{job_id}-ds-{datasource_id}"),
                    user_id: request.user_id.clone(),
                    chatbot_id: request.chatbot_id.clone(),
                    chunks,
                    created_at: Utc::now(),
                    retry_count: 0,
                };
                let embedding_job_id = embedding_job.job_id.clone();
                let chunk_count = embedding_job.chunks.len();

                if self.pool.enqueue_embedding(embedding_job) {
                    enqueued_jobs += 1;
                } else {
                    warn!(
                        job_id = %embedding_job_id,
                        datasource_id,
                        chunks = chunk_count,
                        "Embedding queue is full; dropping job"
                    );
                    dropped_jobs += 1;
                    mark_datasource_failed(&self.storage, &job_id, datasource_id).await;
                }
            }

            info!(
                job_id = %job_id,
                datasources = datasource_count,
                enqueued_jobs,
                dropped_jobs,
                total_chunks,
                "Embedding jobs enqueued"
            );
        }

        info!(
            job_id = %job_id,
            status = ?status,
            successful,
            failed,
            total_chunks,
            "Ingestion job completed"
        );
    }

    async fn decode_all_sources(
        &self,
        job_id: &str,
        request: &ProcessRequest,
    ) -> (Vec<SourceResult>, Vec<ContentChunk>) {
        let options = request.options.clone().unwrap_or_default();
        let chunk_size = if options.chunk_size > 0 {
            options.chunk_size
        } else {
            self.default_chunk_size
        };
        let chunk_overlap = if options.chunk_overlap > 0 {
            options.chunk_overlap
        } else {
            self.default_chunk_overlap
        };
        let factory = Arc::new(DecoderFactory::new(chunk_size, chunk_overlap));

        let ctx = FanoutCtx {
            job_id: job_id.to_string(),
            chatbot_id: request.chatbot_id.clone(),
            user_id: request.user_id.clone(),
            storage: self.storage.clone(),
            results: Arc::new(Mutex::new(Vec::new())),
            all_chunks: Arc::new(Mutex::new(Vec::new())),
        };

        let mut tasks = JoinSet::new();

        for site in &request.website_urls {
            let ctx = ctx.clone();
            let decoder = factory.website(site.url.clone());
            let source = site.url.clone();
            let datasource_id = site.datasource_id;
            tasks.spawn(async move {
                decode_source(ctx, decoder, source, datasource_id).await;
            });
        }

        for qa in &request.qanda_data {
            let ctx = ctx.clone();
            let decoder = factory.qa(qa.clone());
            let source = qa.question.clone();
            let datasource_id = qa.datasource_id;
            tasks.spawn(async move {
                decode_source(ctx, decoder, source, datasource_id).await;
            });
        }

        for doc in &request.documents {
            let ctx = ctx.clone();
            let factory = factory.clone();
            let downloader = self.downloader.clone();
            let doc = doc.clone();
            tasks.spawn(async move {
                info!(
                    url = %doc.download_url,
                    pathname = %doc.pathname,
                    datasource_id = doc.datasource_id,
                    "Downloading document"
                );

                match downloader.download(&doc.download_url, &doc.content_type).await {
                    Ok(file) => {
                        let decoder = factory.document_from_bytes(
                            file.content,
                            doc.pathname.clone(),
                            doc.content_type.clone(),
                        );
                        decode_source(ctx, decoder, doc.pathname, doc.datasource_id).await;
                    }
                    Err(e) => {
                        error!(url = %doc.download_url, error = %e, "Failed to download document");
                        record_failure(
                            &ctx,
                            SourceType::from_content_type(&doc.content_type),
                            doc.pathname,
                            doc.datasource_id,
                            format!("Failed to download: {e}"),
                        )
                        .await;
                    }
                }
            });
        }

        for (i, text) in request.text_content.iter().enumerate() {
            let ctx = ctx.clone();
            let topic = format!("Text content #{}", i + 1);
            let decoder = factory.text(text.content.clone(), topic.clone());
            let datasource_id = text.datasource_id;
            tasks.spawn(async move {
                decode_source(ctx, decoder, topic, datasource_id).await;
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(job_id = %ctx.job_id, error = %e, "Source task panicked");
            }
        }

        let results = ctx.results.lock().unwrap().drain(..).collect();
        let all_chunks = ctx.all_chunks.lock().unwrap().drain(..).collect();
        (results, all_chunks)
    }
}

#[async_trait]
impl IngestionHandler for IngestionPipeline {
    async fn run_ingestion_job(&self, job: IngestionJob) {
        self.process_ingestion_job(job).await;
    }
}

#[derive(Clone)]
struct FanoutCtx {
    job_id: String,
    chatbot_id: String,
    user_id: String,
    storage: Arc<dyn Storage>,
    results: Arc<Mutex<Vec<SourceResult>>>,
    all_chunks: Arc<Mutex<Vec<ContentChunk>>>,
}

async fn decode_source(
    ctx: FanoutCtx,
    decoder: Box<dyn Decoder>,
    source: String,
    datasource_id: i64,
) {
    let start = Instant::now();
    info!(
        job_id = %ctx.job_id,
        %source,
        source_type = %decoder.source_type(),
        datasource_id,
        "Processing source"
    );

    match decoder.decode(&ctx.chatbot_id, &ctx.user_id).await {
        Ok(content) => {
            let duration = start.elapsed();
            let chunk_count = content.chunks.len();
            info!(%source, chunks = chunk_count, ?duration, "Source processed successfully");

            let source_type = content.source_type;
            let chunks = adorn_chunks(content, datasource_id);

            let result = SourceResult {
                datasource_id,
                source_type,
                source,
                status: SourceOutcome::Success,
                message: Some(format!("Processed successfully in {duration:?}")),
                error: None,
                chunk_count,
                processed_at: Utc::now(),
            };

            ctx.results.lock().unwrap().push(result);
            ctx.all_chunks.lock().unwrap().extend(chunks);
        }
        Err(e) => {
            error!(%source, error = %e, "Failed to process source");
            record_failure(&ctx, decoder.source_type(), source, datasource_id, e.to_string()).await;
        }
    }
}

/// Records a failed source result and best-effort marks the datasource
/// FAILED so the caller sees a terminal state.
async fn record_failure(
    ctx: &FanoutCtx,
    source_type: SourceType,
    source: String,
    datasource_id: i64,
    error: String,
) {
    ctx.results.lock().unwrap().push(SourceResult {
        datasource_id,
        source_type,
        source,
        status: SourceOutcome::Failed,
        message: None,
        error: Some(error),
        chunk_count: 0,
        processed_at: Utc::now(),
    });

    mark_datasource_failed(&ctx.storage, &ctx.job_id, datasource_id).await;
}

async fn mark_datasource_failed(storage: &Arc<dyn Storage>, job_id: &str, datasource_id: i64) {
    if let Err(e) = storage
        .update_datasource_status(&[datasource_id], DataSourceStatus::Failed)
        .await
    {
        error!(
            job_id = %job_id,
            datasource_id,
            error = %e,
            "Failed to update datasource status to FAILED"
        );
    }
}

/// Stamps the datasource id and the citation quartet onto every chunk of
/// a decoded source.
fn adorn_chunks(content: ProcessedContent, datasource_id: i64) -> Vec<ContentChunk> {
    let citation = content.citation();
    let source_type = content.source_type;
    let topic = content.topic;

    content
        .chunks
        .into_iter()
        .map(|mut chunk| {
            chunk.datasource_id = datasource_id;
            chunk.metadata.insert("citation".into(), json!(citation));
            chunk
                .metadata
                .insert("sourceType".into(), json!(source_type.as_str()));
            chunk.metadata.insert("topic".into(), json!(topic));
            chunk
                .metadata
                .insert("datasourceId".into(), json!(datasource_id));
            chunk
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::MemoryStorage;
    use common::types::{ChunkMetadata, QaPair, TextContent};

    fn pipeline_with_pool(worker_count: usize, capacity: usize) -> (IngestionPipeline, Arc<WorkerPool>) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let pool = Arc::new(WorkerPool::new(worker_count, capacity, None, storage.clone()));
        (
            IngestionPipeline::new(storage, pool.clone(), 1000, 200),
            pool,
        )
    }

    fn qa_request() -> ProcessRequest {
        ProcessRequest {
            user_id: "u1".into(),
            chatbot_id: "c1".into(),
            website_urls: Vec::new(),
            qanda_data: vec![QaPair {
                datasource_id: 7,
                question: "What is X?".into(),
                answer: "X is Y.".into(),
                citations: None,
            }],
            documents: Vec::new(),
            text_content: vec![TextContent {
                datasource_id: 8,
                content: "Hello world.".into(),
            }],
            options: None,
        }
    }

    #[tokio::test]
    async fn admission_returns_processing_with_total_sources() {
        let (pipeline, _pool) = pipeline_with_pool(1, 10);
        let response = pipeline.process(qa_request()).unwrap();

        assert_eq!(response.status, ProcessStatus::Processing);
        assert_eq!(response.total_sources, 2);
        assert_eq!(response.message, "Job queued for processing");
        assert!(!response.job_id.is_empty());
    }

    #[tokio::test]
    async fn admission_rejects_invalid_request() {
        let (pipeline, _pool) = pipeline_with_pool(1, 10);
        let mut request = qa_request();
        request.qanda_data.clear();
        request.text_content.clear();

        assert!(matches!(
            pipeline.process(request),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admission_rejects_when_queue_is_full() {
        // Workers not started, capacity 1: the first job occupies the
        // only slot, the second is refused with no side effects.
        let (pipeline, _pool) = pipeline_with_pool(1, 1);
        pipeline.process(qa_request()).unwrap();

        let err = pipeline.process(qa_request()).unwrap_err();
        assert!(matches!(err, AppError::AdmissionRejected(message)
            if message.contains("ingestion queue is full")));
    }

    #[tokio::test]
    async fn fan_out_merges_duplicate_datasources_into_one_embedding_job() {
        let (pipeline, pool) = pipeline_with_pool(1, 10);
        let request = ProcessRequest {
            user_id: "u1".into(),
            chatbot_id: "c1".into(),
            website_urls: Vec::new(),
            qanda_data: vec![QaPair {
                datasource_id: 5,
                question: "Q".into(),
                answer: "A".into(),
                citations: None,
            }],
            documents: Vec::new(),
            text_content: vec![TextContent {
                datasource_id: 5,
                content: "same datasource".into(),
            }],
            options: None,
        };

        pipeline
            .process_ingestion_job(IngestionJob {
                job_id: "job-merge".into(),
                request,
            })
            .await;

        assert_eq!(pool.embedding_queue_len(), 1);
    }

    #[tokio::test]
    async fn fan_out_creates_one_embedding_job_per_datasource() {
        let (pipeline, pool) = pipeline_with_pool(1, 10);

        pipeline
            .process_ingestion_job(IngestionJob {
                job_id: "job-split".into(),
                request: qa_request(),
            })
            .await;

        assert_eq!(pool.embedding_queue_len(), 2);
    }

    #[test]
    fn adorned_chunks_carry_the_citation_quartet() {
        let content = ProcessedContent {
            source_type: SourceType::Qa,
            topic: "What is X?".into(),
            content: "Question: What is X?\nAnswer: X is Y.".into(),
            chunks: vec![ContentChunk::new(
                0,
                "Question: What is X?\nAnswer: X is Y.".into(),
                ChunkMetadata::new(),
            )],
            metadata: ChunkMetadata::new(),
        };

        let chunks = adorn_chunks(content, 7);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].datasource_id, 7);
        assert_eq!(chunks[0].metadata.get("citation").unwrap(), "QnA");
        assert_eq!(chunks[0].metadata.get("sourceType").unwrap(), "qa");
        assert_eq!(chunks[0].metadata.get("topic").unwrap(), "What is X?");
        assert_eq!(chunks[0].metadata.get("datasourceId").unwrap(), 7);
    }
}
