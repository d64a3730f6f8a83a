use async_trait::async_trait;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, QaPair, SourceType};
use serde_json::json;
use tracing::info;

use super::Decoder;

/// Q&A pairs are stored as single chunks without splitting.
pub struct QaDecoder {
    pair: QaPair,
}

impl QaDecoder {
    pub fn new(pair: QaPair) -> Self {
        Self { pair }
    }
}

#[async_trait]
impl Decoder for QaDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Qa
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(question = %self.pair.question, chatbot_id, "Decoding Q&A pair");

        let content = format!(
            "Question: {}\nAnswer: {}",
            self.pair.question, self.pair.answer
        );

        let mut chunk_metadata = ChunkMetadata::new();
        chunk_metadata.insert("question".into(), json!(self.pair.question));
        chunk_metadata.insert("answer".into(), json!(self.pair.answer));

        let chunk = ContentChunk::new(0, content.clone(), chunk_metadata);

        let mut metadata = ChunkMetadata::new();
        metadata.insert("question".into(), json!(self.pair.question));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));

        Ok(ProcessedContent {
            source_type: SourceType::Qa,
            topic: self.pair.question.clone(),
            content,
            chunks: vec![chunk],
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> QaPair {
        QaPair {
            datasource_id: 7,
            question: "What is X?".into(),
            answer: "X is Y.".into(),
            citations: None,
        }
    }

    #[tokio::test]
    async fn produces_exactly_one_chunk() {
        let decoder = QaDecoder::new(pair());
        let content = decoder.decode("c1", "u1").await.unwrap();

        assert_eq!(content.chunks.len(), 1);
        assert_eq!(content.chunks[0].chunk_index, 0);
        assert_eq!(
            content.chunks[0].content,
            "Question: What is X?\nAnswer: X is Y."
        );
        assert_eq!(content.topic, "What is X?");
    }

    #[tokio::test]
    async fn single_chunk_regardless_of_length() {
        let mut long = pair();
        long.answer = "very long answer ".repeat(500);
        let decoder = QaDecoder::new(long);
        let content = decoder.decode("c1", "u1").await.unwrap();
        assert_eq!(content.chunks.len(), 1);
    }

    #[tokio::test]
    async fn citation_is_qna() {
        let decoder = QaDecoder::new(pair());
        let content = decoder.decode("c1", "u1").await.unwrap();
        assert_eq!(content.citation(), "QnA");
    }
}
