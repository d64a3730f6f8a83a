use async_trait::async_trait;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
use serde_json::json;
use tracing::info;

use super::Decoder;

/// Deepest header level that opens a new section.
const HEADER_DEPTH_MAX: usize = 4;

/// Splits a Markdown document into header-bounded sections, one chunk per
/// section with the header kept inside the body. No recursive chunker
/// pass: sections are the author's own semantic boundaries.
pub struct MarkdownDecoder {
    content: Vec<u8>,
    filename: String,
}

impl MarkdownDecoder {
    pub fn new(content: Vec<u8>, filename: String) -> Self {
        Self { content, filename }
    }
}

#[async_trait]
impl Decoder for MarkdownDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Markdown
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(filename = %self.filename, chatbot_id, "Decoding Markdown file");

        let full_content = String::from_utf8_lossy(&self.content).into_owned();
        if full_content.trim().is_empty() {
            return Err(AppError::Decode("markdown file is empty".into()));
        }

        let sections = split_sections(&full_content);

        let chunks: Vec<ContentChunk> = sections
            .into_iter()
            .enumerate()
            .map(|(i, section)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("filename".into(), json!(self.filename));
                if let Some(header) = &section.header {
                    metadata.insert("header".into(), json!(header));
                }
                ContentChunk::new(i, section.body, metadata)
            })
            .collect();

        info!(
            filename = %self.filename,
            chunks = chunks.len(),
            "Markdown decoded"
        );

        let mut metadata = ChunkMetadata::new();
        metadata.insert("filename".into(), json!(self.filename));
        metadata.insert("fileSize".into(), json!(self.content.len()));
        metadata.insert("contentType".into(), json!("text/markdown"));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));

        Ok(ProcessedContent {
            source_type: SourceType::Markdown,
            topic: self.filename.clone(),
            content: full_content,
            chunks,
            metadata,
        })
    }
}

struct Section {
    header: Option<String>,
    body: String,
}

fn is_section_header(line: &str) -> bool {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    (1..=HEADER_DEPTH_MAX).contains(&hashes)
        && line[hashes..].starts_with(' ')
}

fn split_sections(content: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut header: Option<String> = None;
    let mut buffer = String::new();

    fn flush(header: &mut Option<String>, buffer: &mut String, out: &mut Vec<Section>) {
        let body = buffer.trim().to_string();
        if !body.is_empty() {
            out.push(Section {
                header: header.take(),
                body,
            });
        }
        buffer.clear();
    }

    for line in content.lines() {
        if is_section_header(line.trim_start()) {
            flush(&mut header, &mut buffer, &mut sections);
            header = Some(line.trim().to_string());
        }
        buffer.push_str(line);
        buffer.push('\n');
    }
    flush(&mut header, &mut buffer, &mut sections);

    sections
}
