use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::error::AppError;
use common::types::{ChunkMetadata, ContentChunk, ProcessedContent, SourceType};
use dom_smoothie::{Readability, TextMode};
use serde_json::json;
use tracing::{info, warn};

use super::Decoder;
use crate::chunker::TextChunker;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Fetches a web page and extracts its main text via readability before
/// handing it to the chunker.
pub struct WebsiteDecoder {
    url: String,
    chunker: TextChunker,
}

impl WebsiteDecoder {
    pub fn new(url: String, chunker: TextChunker) -> Self {
        Self { url, chunker }
    }
}

#[async_trait]
impl Decoder for WebsiteDecoder {
    fn source_type(&self) -> SourceType {
        SourceType::Website
    }

    async fn decode(&self, chatbot_id: &str, user_id: &str) -> Result<ProcessedContent, AppError> {
        info!(url = %self.url, chatbot_id, "Decoding website");

        let parsed = url::Url::parse(&self.url)
            .map_err(|_| AppError::Decode(format!("invalid URL: {}", self.url)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                warn!(url = %self.url, %scheme, "Rejected website URL with unsupported scheme");
                return Err(AppError::Decode(format!(
                    "unsupported URL scheme: {scheme}"
                )));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()?;

        let response = client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AppError::Decode(format!("failed to fetch URL: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Decode(format!(
                "website returned status {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::Decode(format!("failed to read response body: {e}")))?;
        let full_content = extract_main_text(&html, &self.url)?;

        if full_content.trim().is_empty() {
            return Err(AppError::Decode("no content loaded from URL".into()));
        }

        let chunks: Vec<ContentChunk> = self
            .chunker
            .chunk_text(&full_content)
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                let mut metadata = ChunkMetadata::new();
                metadata.insert("url".into(), json!(self.url));
                ContentChunk::new(i, body, metadata)
            })
            .collect();

        info!(url = %self.url, chunks = chunks.len(), "Website decoded");

        let mut metadata = ChunkMetadata::new();
        metadata.insert("url".into(), json!(self.url));
        metadata.insert("scrapedAt".into(), json!(Utc::now()));
        metadata.insert("chatbotId".into(), json!(chatbot_id));
        metadata.insert("userId".into(), json!(user_id));

        Ok(ProcessedContent {
            source_type: SourceType::Website,
            topic: self.url.clone(),
            content: full_content,
            chunks,
            metadata,
        })
    }
}

fn extract_main_text(html: &str, url: &str) -> Result<String, AppError> {
    let config = dom_smoothie::Config {
        text_mode: TextMode::Formatted,
        ..Default::default()
    };
    let mut readability = Readability::new(html, Some(url), Some(config))
        .map_err(|e| AppError::Decode(format!("failed to parse HTML: {e}")))?;
    let article = readability
        .parse()
        .map_err(|e| AppError::Decode(format!("failed to extract article: {e}")))?;

    Ok(article.text_content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_invalid_url() {
        let decoder = WebsiteDecoder::new("not a url".into(), TextChunker::new(1000, 200));
        assert!(matches!(
            decoder.decode("c1", "u1").await,
            Err(AppError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unsupported_scheme() {
        let decoder =
            WebsiteDecoder::new("ftp://example.com/page".into(), TextChunker::new(1000, 200));
        assert!(matches!(
            decoder.decode("c1", "u1").await,
            Err(AppError::Decode(_))
        ));
    }

    #[test]
    fn extracts_main_text_from_html() {
        let paragraph = "The quick brown fox jumps over the lazy dog while the \
readability pass looks for a substantial main body of prose. Each paragraph here \
carries several full sentences so the extraction scores the article content well \
above any boilerplate navigation markup that might surround it on a real page. ";
        let html = format!(
            "<html><head><title>T</title></head><body><article><h1>Heading</h1>\
<p>{p}</p><p>{p}</p><p>{p}</p></article></body></html>",
            p = paragraph
        );
        let text = extract_main_text(&html, "https://example.com/post").unwrap();
        assert!(text.contains("quick brown fox"));
    }
}
