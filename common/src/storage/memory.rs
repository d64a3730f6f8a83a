use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;
use crate::types::DataSourceStatus;

use super::{EmbeddingRow, Storage};

/// A persisted embedding row, as the in-memory store keeps it.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub user_id: String,
    pub chatbot_id: String,
    pub datasource_id: Option<i64>,
    pub citation: Option<String>,
    pub text: String,
    pub vector: Vec<f64>,
}

#[derive(Default)]
struct Inner {
    embeddings: Vec<StoredEmbedding>,
    statuses: HashMap<i64, DataSourceStatus>,
    insert_calls: usize,
    status_calls: usize,
    failing_inserts: usize,
    failing_status_updates: usize,
}

/// In-memory storage gateway used by tests and local runs without a
/// database. Supports deterministic failure injection: the next N calls
/// of either operation can be made to fail.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` insert calls fail with a persist error.
    pub fn fail_next_inserts(&self, count: usize) {
        self.inner.lock().unwrap().failing_inserts = count;
    }

    /// Make the next `count` status updates fail.
    pub fn fail_next_status_updates(&self, count: usize) {
        self.inner.lock().unwrap().failing_status_updates = count;
    }

    pub fn embeddings(&self) -> Vec<StoredEmbedding> {
        self.inner.lock().unwrap().embeddings.clone()
    }

    pub fn embeddings_for(&self, datasource_id: i64) -> Vec<StoredEmbedding> {
        self.inner
            .lock()
            .unwrap()
            .embeddings
            .iter()
            .filter(|row| row.datasource_id == Some(datasource_id))
            .cloned()
            .collect()
    }

    pub fn status_of(&self, datasource_id: i64) -> Option<DataSourceStatus> {
        self.inner.lock().unwrap().statuses.get(&datasource_id).copied()
    }

    pub fn insert_call_count(&self) -> usize {
        self.inner.lock().unwrap().insert_calls
    }

    pub fn status_call_count(&self) -> usize {
        self.inner.lock().unwrap().status_calls
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn batch_insert_embeddings(
        &self,
        user_id: &str,
        chatbot_id: &str,
        rows: Vec<EmbeddingRow>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert_calls += 1;

        if inner.failing_inserts > 0 {
            inner.failing_inserts -= 1;
            return Err(AppError::Persist("injected insert failure".into()));
        }

        // All-or-nothing, same as the transactional Postgres path.
        for row in rows {
            inner.embeddings.push(StoredEmbedding {
                user_id: user_id.to_string(),
                chatbot_id: chatbot_id.to_string(),
                datasource_id: row.datasource_id,
                citation: row.citation,
                text: row.text,
                vector: row.vector,
            });
        }
        Ok(())
    }

    async fn update_datasource_status(
        &self,
        datasource_ids: &[i64],
        status: DataSourceStatus,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_calls += 1;

        if inner.failing_status_updates > 0 {
            inner.failing_status_updates -= 1;
            return Err(AppError::StatusUpdate("injected status failure".into()));
        }

        for id in datasource_ids {
            inner.statuses.insert(*id, status);
        }
        Ok(())
    }
}
