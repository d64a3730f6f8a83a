use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::storage::Storage;
use common::types::{ContentChunk, ProcessRequest};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::embedder::Embedder;
use crate::worker::EmbeddingWorker;

/// Retry budget per embedding job; a chunk appears in at most four jobs
/// (one initial dispatch plus three retries).
pub const MAX_EMBEDDING_RETRIES: u32 = 3;

const QUEUE_CAPACITY_FLOOR: usize = 100;

/// One admitted request awaiting decode and fan-out.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub job_id: String,
    pub request: ProcessRequest,
}

/// One datasource's chunk set awaiting vectorisation and persistence.
#[derive(Debug, Clone)]
pub struct EmbeddingJob {
    pub job_id: String,
    pub user_id: String,
    pub chatbot_id: String,
    pub chunks: Vec<ContentChunk>,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl EmbeddingJob {
    /// The retry generation carrying only the given chunks. Each
    /// generation appends `-retry` so job ids stay traceable in logs.
    pub fn retry_with(&self, chunks: Vec<ContentChunk>) -> Self {
        Self {
            job_id: format!("{}-retry", self.job_id),
            user_id: self.user_id.clone(),
            chatbot_id: self.chatbot_id.clone(),
            chunks,
            created_at: Utc::now(),
            retry_count: self.retry_count + 1,
        }
    }
}

/// Receives ingestion jobs popped off the queue by pool workers.
#[async_trait]
pub trait IngestionHandler: Send + Sync {
    async fn run_ingestion_job(&self, job: IngestionJob);
}

/// Clonable handle for submitting embedding jobs; also used by the
/// embedding worker itself to requeue failed chunks.
#[derive(Clone)]
pub struct EmbeddingQueue {
    tx: flume::Sender<EmbeddingJob>,
    stopping: Arc<AtomicBool>,
}

impl EmbeddingQueue {
    /// Non-blocking submit. `false` means the queue is full or the pool
    /// is stopping; there is no retry of enqueue.
    pub fn try_enqueue(&self, job: EmbeddingJob) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.try_send(job).is_ok()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(tx: flume::Sender<EmbeddingJob>) -> Self {
        Self {
            tx,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Two-channel scheduler: `worker_count` cooperative loops select over
/// {quit, ingestion jobs, embedding jobs} with no priority between the
/// queues.
pub struct WorkerPool {
    ingestion_tx: flume::Sender<IngestionJob>,
    ingestion_rx: flume::Receiver<IngestionJob>,
    embedding_tx: flume::Sender<EmbeddingJob>,
    embedding_rx: flume::Receiver<EmbeddingJob>,
    quit_tx: watch::Sender<bool>,
    quit_rx: watch::Receiver<bool>,
    stopping: Arc<AtomicBool>,
    started: AtomicBool,
    worker_count: usize,
    embedder: Option<Arc<dyn Embedder>>,
    storage: Arc<dyn Storage>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        queue_capacity: usize,
        embedder: Option<Arc<dyn Embedder>>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let queue_capacity = if queue_capacity == 0 {
            QUEUE_CAPACITY_FLOOR
        } else {
            queue_capacity
        };

        let (ingestion_tx, ingestion_rx) = flume::bounded(queue_capacity);
        let (embedding_tx, embedding_rx) = flume::bounded(queue_capacity);
        let (quit_tx, quit_rx) = watch::channel(false);

        Self {
            ingestion_tx,
            ingestion_rx,
            embedding_tx,
            embedding_rx,
            quit_tx,
            quit_rx,
            stopping: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
            worker_count,
            embedder,
            storage,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker loops. Idempotent: later calls are no-ops.
    pub fn start(&self, handler: Arc<dyn IngestionHandler>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock().unwrap();
        for worker_id in 1..=self.worker_count {
            let mut quit_rx = self.quit_rx.clone();
            let ingestion_rx = self.ingestion_rx.clone();
            let embedding_rx = self.embedding_rx.clone();
            let handler = handler.clone();
            let worker = EmbeddingWorker::new(
                self.embedder.clone(),
                self.storage.clone(),
                self.embedding_queue(),
            );

            handles.push(tokio::spawn(async move {
                info!(worker_id, "Worker started");
                loop {
                    tokio::select! {
                        _ = quit_rx.changed() => {
                            info!(worker_id, "Worker stopping");
                            break;
                        }
                        Ok(job) = ingestion_rx.recv_async() => {
                            handler.run_ingestion_job(job).await;
                        }
                        Ok(job) = embedding_rx.recv_async() => {
                            worker.process(worker_id, job).await;
                        }
                    }
                }
            }));
        }
    }

    /// Non-blocking submit of an admitted request.
    pub fn enqueue_ingestion(&self, job: IngestionJob) -> bool {
        if self.stopping.load(Ordering::SeqCst) {
            return false;
        }
        self.ingestion_tx.try_send(job).is_ok()
    }

    /// Non-blocking submit of a per-datasource embedding job.
    pub fn enqueue_embedding(&self, job: EmbeddingJob) -> bool {
        self.embedding_queue().try_enqueue(job)
    }

    pub fn embedding_queue(&self) -> EmbeddingQueue {
        EmbeddingQueue {
            tx: self.embedding_tx.clone(),
            stopping: self.stopping.clone(),
        }
    }

    pub fn embedding_queue_len(&self) -> usize {
        self.embedding_tx.len()
    }

    /// Stops accepting work and waits for in-flight jobs up to the given
    /// deadline. Jobs already running finish or hit their own timeouts.
    pub async fn stop(&self, timeout: Duration) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }

        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.quit_tx.send(true);

        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => info!("All workers stopped"),
            Err(_) => warn!("Timeout waiting for workers to stop"),
        }
    }
}
