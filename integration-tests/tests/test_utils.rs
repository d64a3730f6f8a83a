#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::error::AppError;
use common::storage::{MemoryStorage, Storage};
use ingestion_pipeline::embedder::{Embedder, EMBEDDING_DIM};
use ingestion_pipeline::{IngestionPipeline, WorkerPool};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Deterministic embedder with programmable failures, mirroring the kind
/// of backend the pipeline talks to in production.
pub struct MockEmbedder {
    transient_failures_per_text: usize,
    seen: Mutex<HashMap<String, usize>>,
    fail_needle: Option<String>,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            transient_failures_per_text: 0,
            seen: Mutex::new(HashMap::new()),
            fail_needle: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail the first `failures` calls for each distinct text, then
    /// succeed.
    pub fn failing_first_per_text(mut self, failures: usize) -> Self {
        self.transient_failures_per_text = failures;
        self
    }

    /// Always fail texts containing the needle.
    pub fn fail_texts_containing(mut self, needle: impl Into<String>) -> Self {
        self.fail_needle = Some(needle.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(needle) = &self.fail_needle {
            if text.contains(needle) {
                return Err(AppError::Embed(format!(
                    "mock failure for text containing {needle:?}"
                )));
            }
        }

        if self.transient_failures_per_text > 0 {
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(text.to_string()).or_insert(0);
            if *count < self.transient_failures_per_text {
                *count += 1;
                return Err(AppError::Embed("mock transient failure".into()));
            }
        }

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let index = (hasher.finish() as usize) % EMBEDDING_DIM;
        let mut vector = vec![0.0; EMBEDDING_DIM];
        vector[index] = 1.0;
        Ok(vector)
    }
}

/// A running pipeline wired against in-memory storage and the given
/// embedder, with workers already started.
pub struct TestHarness {
    pub storage: Arc<MemoryStorage>,
    pub pool: Arc<WorkerPool>,
    pub pipeline: Arc<IngestionPipeline>,
}

pub fn start_pipeline(embedder: Option<Arc<dyn Embedder>>) -> TestHarness {
    start_pipeline_with(embedder, 2, 100)
}

pub fn start_pipeline_with(
    embedder: Option<Arc<dyn Embedder>>,
    worker_count: usize,
    queue_capacity: usize,
) -> TestHarness {
    let storage = Arc::new(MemoryStorage::new());
    let storage_dyn: Arc<dyn Storage> = storage.clone();
    let pool = Arc::new(WorkerPool::new(
        worker_count,
        queue_capacity,
        embedder,
        storage_dyn.clone(),
    ));
    let pipeline = Arc::new(IngestionPipeline::new(storage_dyn, pool.clone(), 1000, 200));
    pool.start(pipeline.clone());

    TestHarness {
        storage,
        pool,
        pipeline,
    }
}

/// Polls until the condition holds or the timeout elapses.
pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Minimal canned-response HTTP origin for download and website tests.
/// Serves the same response to every request and returns its base URL.
pub async fn spawn_http_origin(
    status_line: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}
