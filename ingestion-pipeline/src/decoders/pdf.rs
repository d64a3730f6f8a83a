use async_trait::async_trait;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
use lopdf::Document;
use serde_json::json;
use tracing::{info, warn};

use super::Decoder;
use crate::chunker::TextChunker;

/// Decodes a PDF byte slice page by page and chunks the concatenated
/// text. Parsing happens on a blocking thread; lopdf is pure CPU work
/// but large documents take a while.
pub struct PdfDecoder {
    content: Vec<u8>,
    filename: String,
    chunker: TextChunker,
}

impl PdfDecoder {
    pub fn new(content: Vec<u8>, filename: String, chunker: TextChunker) -> Self {
        Self {
            content,
            filename,
            chunker,
        }
    }
}

#[async_trait]
impl Decoder for PdfDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Pdf
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(
            filename = %self.filename,
            bytes = self.content.len(),
            chatbot_id,
            "Decoding PDF"
        );

        let bytes = self.content.clone();
        let filename = self.filename.clone();
        let (full_content, page_count) =
            tokio::task::spawn_blocking(move || extract_pages(&bytes, &filename)).await??;

        let chunks: Vec<ContentChunk> = self
            .chunker
            .chunk_text(&full_content)
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("filename".into(), json!(self.filename));
                ContentChunk::new(i, body, metadata)
            })
            .collect();

        info!(
            filename = %self.filename,
            pages = page_count,
            chunks = chunks.len(),
            "PDF decoded"
        );

        let mut metadata = ChunkMetadata::new();
        metadata.insert("filename".into(), json!(self.filename));
        metadata.insert("fileSize".into(), json!(self.content.len()));
        metadata.insert("contentType".into(), json!("application/pdf"));
        metadata.insert("pageCount".into(), json!(page_count));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));

        Ok(ProcessedContent {
            source_type: SourceType::Pdf,
            topic: self.filename.clone(),
            content: full_content,
            chunks,
            metadata,
        })
    }
}

fn extract_pages(bytes: &[u8], filename: &str) -> Result<(String, usize), AppError> {
    let document = Document::load_mem(bytes)
        .map_err(|e| AppError::Decode(format!("failed to parse PDF: {e}")))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(AppError::Decode("PDF has no pages".into()));
    }

    let mut pages_text = Vec::with_capacity(page_numbers.len());
    for page in &page_numbers {
        match document.extract_text(&[*page]) {
            Ok(text) => {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    pages_text.push(text);
                }
            }
            Err(e) => {
                warn!(filename, page, error = %e, "Failed to extract text from page");
            }
        }
    }

    let full_content = pages_text.join("\n\n");
    if full_content.is_empty() {
        return Err(AppError::Decode(
            "no text content extracted from PDF".into(),
        ));
    }

    Ok((full_content, page_numbers.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_fail_to_parse() {
        let decoder = PdfDecoder::new(
            b"not a pdf at all".to_vec(),
            "broken.pdf".into(),
            TextChunker::new(1000, 200),
        );
        let err = decoder.decode("c1", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Decode(message) if message.contains("parse")));
    }

    #[tokio::test]
    async fn document_without_pages_is_an_error() {
        use lopdf::{dictionary, Object};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Count" => 0,
            "Kids" => Object::Array(vec![]),
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let decoder = PdfDecoder::new(bytes, "empty.pdf".into(), TextChunker::new(1000, 200));
        let err = decoder.decode("c1", "u1").await.unwrap_err();
        assert!(matches!(err, AppError::Decode(message) if message.contains("no pages")));
    }
}
