mod csv;
mod markdown;
mod pdf;
mod qa;
mod text;
mod website;

use async_trait::async_trait;
use common::error::AppError;
use common::types::{ProcessedContent, QaPair, SourceType};

use crate::chunker::TextChunker;

pub use self::csv::CsvDecoder;
pub use self::markdown::MarkdownDecoder;
pub use self::pdf::PdfDecoder;
pub use self::qa::QaDecoder;
pub use self::text::TextDecoder;
pub use self::website::WebsiteDecoder;

/// Turns one source into a `ProcessedContent`. Decoders do no I/O beyond
/// their own scope (only the website decoder touches the network).
#[async_trait]
pub trait Decoder: Send + Sync {
    fn source_type(&self) -> SourceType;
    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError>;
}

/// Builds decoders configured with the request's chunking parameters.
pub struct DecoderFactory {
    chunker: TextChunker,
}

impl DecoderFactory {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunker: TextChunker::new(chunk_size, chunk_overlap),
        }
    }

    pub fn website(&self, url: String) -> Box<dyn Decoder> {
        Box::new(WebsiteDecoder::new(url, self.chunker.clone()))
    }

    pub fn qa(&self, pair: QaPair) -> Box<dyn Decoder> {
        Box::new(QaDecoder::new(pair))
    }

    pub fn text(&self, content: String, topic: String) -> Box<dyn Decoder> {
        Box::new(TextDecoder::inline(content, topic, self.chunker.clone()))
    }

    /// Routes a downloaded document to a decoder by `(content type,
    /// filename suffix)`, most specific first; unknown kinds fall back to
    /// plain text.
    pub fn document_from_bytes(
        &self,
        content: Vec<u8>,
        pathname: String,
        content_type: String,
    ) -> Box<dyn Decoder> {
        let ct = content_type.to_ascii_lowercase();
        let name = pathname.to_ascii_lowercase();

        if ct.contains("pdf") || name.ends_with(".pdf") {
            Box::new(PdfDecoder::new(content, pathname, self.chunker.clone()))
        } else if ct.contains("csv") || name.ends_with(".csv") {
            Box::new(CsvDecoder::new(content, pathname))
        } else if name.ends_with(".md") || name.ends_with(".markdown") {
            Box::new(MarkdownDecoder::new(content, pathname))
        } else {
            Box::new(TextDecoder::from_file(
                content,
                pathname,
                content_type,
                self.chunker.clone(),
            ))
        }
    }
}
