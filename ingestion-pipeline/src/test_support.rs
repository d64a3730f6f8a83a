#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use common::error::AppError;

use crate::embedder::{Embedder, EMBEDDING_DIM};

/// Deterministic embedder for unit tests. Returns a unit basis vector
/// derived from the text's hash; failure behavior is programmable per
/// text.
pub(crate) struct MockEmbedder {
    /// Fail the first N calls for each distinct text, then succeed.
    transient_failures_per_text: usize,
    seen: Mutex<HashMap<String, usize>>,
    /// Always fail texts containing this needle.
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

    pub fn failing_first_per_text(mut self, failures: usize) -> Self {
        self.transient_failures_per_text = failures;
        self
    }

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

        Ok(unit_vector_for(text))
    }
}

pub(crate) fn unit_vector_for(text: &str) -> Vec<f64> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let index = (hasher.finish() as usize) % EMBEDDING_DIM;

    let mut vector = vec![0.0; EMBEDDING_DIM];
    vector[index] = 1.0;
    vector
}
