use async_trait::async_trait;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
use serde_json::json;
use tracing::info;

use super::Decoder;
use crate::chunker::TextChunker;

/// Decodes raw text, either inline request content or a downloaded file.
pub struct TextDecoder {
    content: String,
    topic: String,
    file: Option<FileOrigin>,
    chunker: TextChunker,
}

struct FileOrigin {
    filename: String,
    content_type: String,
    file_size: usize,
}

impl TextDecoder {
    pub fn inline(content: String, topic: String, chunker: TextChunker) -> Self {
        let topic = if topic.is_empty() {
            "Direct text input".to_string()
        } else {
            topic
        };
        Self {
            content,
            topic,
            file: None,
            chunker,
        }
    }

    pub fn from_file(
        bytes: Vec<u8>,
        filename: String,
        content_type: String,
        chunker: TextChunker,
    ) -> Self {
        let file_size = bytes.len();
        Self {
            content: String::from_utf8_lossy(&bytes).into_owned(),
            topic: filename.clone(),
            file: Some(FileOrigin {
                filename,
                content_type,
                file_size,
            }),
            chunker,
        }
    }
}

#[async_trait]
impl Decoder for TextDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Text
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(
            topic = %self.topic,
            from_file = self.file.is_some(),
            chatbot_id,
            "Decoding text content"
        );

        if self.content.trim().is_empty() {
            return Err(AppError::Decode("text content is empty".into()));
        }

        let chunks: Vec<ContentChunk> = self
            .chunker
            .chunk_text(&self.content)
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("topic".into(), json!(self.topic));
                if let Some(file) = &self.file {
                    metadata.insert("filename".into(), json!(file.filename));
                }
                ContentChunk::new(i, body, metadata)
            })
            .collect();

        let mut metadata = ChunkMetadata::new();
        metadata.insert("topic".into(), json!(self.topic));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));
        if let Some(file) = &self.file {
            metadata.insert("filename".into(), json!(file.filename));
            metadata.insert("fileSize".into(), json!(file.file_size));
            metadata.insert("contentType".into(), json!(file.content_type));
        }

        Ok(ProcessedContent {
            source_type: SourceType::Text,
            topic: self.topic.clone(),
            content: self.content.clone(),
            chunks,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let decoder = TextDecoder::inline("   ".into(), "t".into(), TextChunker::new(100, 10));
        assert!(matches!(
            decoder.decode("c1", "u1").await,
            Err(AppError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn short_text_yields_one_chunk_with_dense_index() {
        let decoder = TextDecoder::inline(
            "Hello world.".into(),
            "Text content #1".into(),
            TextChunker::new(1000, 200),
        );
        let content = decoder.decode("c1", "u1").await.unwrap();
        assert_eq!(content.chunks.len(), 1);
        assert_eq!(content.chunks[0].chunk_index, 0);
        assert_eq!(content.chunks[0].content, "Hello world.");
    }

    #[tokio::test]
    async fn long_text_gets_dense_indices() {
        let decoder = TextDecoder::inline(
            "sentence one. ".repeat(100),
            "topic".into(),
            TextChunker::new(100, 20),
        );
        let content = decoder.decode("c1", "u1").await.unwrap();
        assert!(content.chunks.len() > 1);
        for (i, chunk) in content.chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[tokio::test]
    async fn file_variant_carries_filename_metadata() {
        let decoder = TextDecoder::from_file(
            b"file body".to_vec(),
            "notes.txt".into(),
            "text/plain".into(),
            TextChunker::new(1000, 200),
        );
        let content = decoder.decode("c1", "u1").await.unwrap();
        assert_eq!(content.topic, "notes.txt");
        assert_eq!(content.citation(), "notes.txt");
        assert_eq!(
            content.chunks[0].metadata.get("filename").unwrap(),
            "notes.txt"
        );
    }
}
