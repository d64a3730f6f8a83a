use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form per-chunk metadata. Decoders populate type-specific keys
/// (`filename`, `url`, `row_data`, ...); the orchestrator adds the
/// `citation` / `sourceType` / `topic` / `datasourceId` quartet before
/// chunks are handed to an embedding job.
pub type ChunkMetadata = HashMap<String, Value>;

/// Kind of source a chunk was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Website,
    Qa,
    Pdf,
    Csv,
    Markdown,
    Text,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Qa => "qa",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    /// Best-effort classification of a document content type, used when a
    /// download fails before any decoder ran.
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("pdf") {
            Self::Pdf
        } else if ct.contains("csv") {
            Self::Csv
        } else if ct.contains("markdown") {
            Self::Markdown
        } else {
            Self::Text
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded, bounded-size text fragment; the unit of embedding and storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Datasource this chunk belongs to. Decoders leave this at zero; the
    /// orchestrator stamps the real id during citation adornment.
    pub datasource_id: i64,
    /// Dense 0-based position within the decoder's output.
    pub chunk_index: usize,
    pub content: String,
    /// Populated by the embedding worker, absent until then.
    pub embedding: Option<Vec<f64>>,
    pub metadata: ChunkMetadata,
}

impl ContentChunk {
    pub fn new(chunk_index: usize, content: String, metadata: ChunkMetadata) -> Self {
        Self {
            datasource_id: 0,
            chunk_index,
            content,
            embedding: None,
            metadata,
        }
    }
}

/// Output of a source decoder: the full text plus its chunked form.
#[derive(Debug, Clone)]
pub struct ProcessedContent {
    pub source_type: SourceType,
    pub topic: String,
    pub content: String,
    pub chunks: Vec<ContentChunk>,
    pub metadata: ChunkMetadata,
}

impl ProcessedContent {
    /// Human-facing origin string stored next to every embedding row.
    ///
    /// Websites cite their URL, Q&A pairs cite the literal `"QnA"`, and
    /// documents cite their filename; the topic is the fallback when the
    /// preferred key is missing or empty.
    pub fn citation(&self) -> String {
        match self.source_type {
            SourceType::Website => self
                .metadata_str("url")
                .unwrap_or_else(|| self.topic.clone()),
            SourceType::Qa => "QnA".to_string(),
            SourceType::Pdf | SourceType::Csv | SourceType::Markdown | SourceType::Text => self
                .metadata_str("filename")
                .unwrap_or_else(|| self.topic.clone()),
        }
    }

    fn metadata_str(&self, key: &str) -> Option<String> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content_with(source_type: SourceType, metadata: ChunkMetadata) -> ProcessedContent {
        ProcessedContent {
            source_type,
            topic: "fallback topic".to_string(),
            content: String::new(),
            chunks: Vec::new(),
            metadata,
        }
    }

    #[test]
    fn website_citation_prefers_url() {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("url".into(), json!("https://example.com/docs"));
        let content = content_with(SourceType::Website, metadata);
        assert_eq!(content.citation(), "https://example.com/docs");
    }

    #[test]
    fn website_citation_falls_back_to_topic() {
        let content = content_with(SourceType::Website, ChunkMetadata::new());
        assert_eq!(content.citation(), "fallback topic");
    }

    #[test]
    fn qa_citation_is_literal() {
        let content = content_with(SourceType::Qa, ChunkMetadata::new());
        assert_eq!(content.citation(), "QnA");
    }

    #[test]
    fn document_citation_prefers_filename() {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("filename".into(), json!("report.pdf"));
        let content = content_with(SourceType::Pdf, metadata);
        assert_eq!(content.citation(), "report.pdf");
    }

    #[test]
    fn empty_filename_falls_back_to_topic() {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("filename".into(), json!(""));
        let content = content_with(SourceType::Csv, metadata);
        assert_eq!(content.citation(), "fallback topic");
    }

    #[test]
    fn source_type_from_content_type() {
        assert_eq!(
            SourceType::from_content_type("application/pdf"),
            SourceType::Pdf
        );
        assert_eq!(SourceType::from_content_type("text/csv"), SourceType::Csv);
        assert_eq!(
            SourceType::from_content_type("text/markdown"),
            SourceType::Markdown
        );
        assert_eq!(
            SourceType::from_content_type("application/octet-stream"),
            SourceType::Text
        );
    }
}
