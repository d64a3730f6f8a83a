use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

use super::chunk::SourceType;

/// Document content types the pipeline accepts.
pub const ALLOWED_DOCUMENT_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "text/csv",
    "text/markdown",
    "text/plain",
    "application/octet-stream",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteUrl {
    pub datasource_id: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaPair {
    pub datasource_id: i64,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<String>>,
}

/// An uploaded document referenced by a signed URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub datasource_id: i64,
    pub url: String,
    pub download_url: String,
    pub pathname: String,
    pub content_type: String,
    pub content_disposition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub datasource_id: i64,
    pub content: String,
}

/// Optional per-request chunking overrides; values of zero fall back to
/// the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingOptions {
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_overlap: usize,
}

/// A batch of heterogeneous sources for one chatbot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub user_id: String,
    pub chatbot_id: String,
    #[serde(default)]
    pub website_urls: Vec<WebsiteUrl>,
    #[serde(default)]
    pub qanda_data: Vec<QaPair>,
    #[serde(default)]
    pub documents: Vec<DocumentMetadata>,
    #[serde(default)]
    pub text_content: Vec<TextContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProcessingOptions>,
}

impl ProcessRequest {
    pub fn total_sources(&self) -> usize {
        self.website_urls.len()
            + self.qanda_data.len()
            + self.documents.len()
            + self.text_content.len()
    }

    /// Shape checks performed at admission, before anything is enqueued.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Validation("userId is required".into()));
        }
        if self.chatbot_id.trim().is_empty() {
            return Err(AppError::Validation("chatbotId is required".into()));
        }
        if self.total_sources() == 0 {
            return Err(AppError::Validation(
                "request must contain at least one source".into(),
            ));
        }

        for site in &self.website_urls {
            validate_datasource_id(site.datasource_id)?;
            validate_url(&site.url)?;
        }

        for qa in &self.qanda_data {
            validate_datasource_id(qa.datasource_id)?;
            if qa.question.trim().is_empty() {
                return Err(AppError::Validation("question must not be empty".into()));
            }
            if qa.answer.trim().is_empty() {
                return Err(AppError::Validation("answer must not be empty".into()));
            }
        }

        for doc in &self.documents {
            validate_datasource_id(doc.datasource_id)?;
            validate_url(&doc.url)?;
            validate_url(&doc.download_url)?;
            let content_type = doc.content_type.to_ascii_lowercase();
            if !ALLOWED_DOCUMENT_CONTENT_TYPES
                .iter()
                .any(|allowed| content_type.starts_with(allowed))
            {
                return Err(AppError::Validation(format!(
                    "unsupported document content type: {}",
                    doc.content_type
                )));
            }
        }

        for text in &self.text_content {
            validate_datasource_id(text.datasource_id)?;
            if text.content.trim().is_empty() {
                return Err(AppError::Validation(
                    "text content must not be empty".into(),
                ));
            }
        }

        Ok(())
    }
}

fn validate_datasource_id(id: i64) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::Validation(format!(
            "datasourceId must be positive, got {id}"
        )));
    }
    Ok(())
}

fn validate_url(raw: &str) -> Result<(), AppError> {
    let parsed = url::Url::parse(raw)
        .map_err(|_| AppError::Validation(format!("invalid URL: {raw}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::Validation(format!(
            "unsupported URL scheme: {scheme}"
        ))),
    }
}

/// Aggregate state reported for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Processing,
    Completed,
    Partial,
    Failed,
}

/// Synchronous acknowledgement returned at admission. The pipeline is
/// asynchronous past this point; truth lives in the datasource status
/// column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub job_id: String,
    pub status: ProcessStatus,
    pub message: String,
    pub total_sources: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceOutcome {
    Success,
    Failed,
}

/// Per-source outcome accumulated by the orchestrator during fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub datasource_id: i64,
    pub source_type: SourceType,
    pub source: String,
    pub status: SourceOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub chunk_count: usize,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> ProcessRequest {
        ProcessRequest {
            user_id: "u1".into(),
            chatbot_id: "c1".into(),
            website_urls: Vec::new(),
            qanda_data: Vec::new(),
            documents: Vec::new(),
            text_content: Vec::new(),
            options: None,
        }
    }

    #[test]
    fn rejects_request_without_sources() {
        let request = base_request();
        assert!(matches!(
            request.validate(),
            Err(AppError::Validation(message)) if message.contains("at least one source")
        ));
    }

    #[test]
    fn rejects_missing_user_id() {
        let mut request = base_request();
        request.user_id = "  ".into();
        request.text_content.push(TextContent {
            datasource_id: 1,
            content: "hello".into(),
        });
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_non_positive_datasource_id() {
        let mut request = base_request();
        request.text_content.push(TextContent {
            datasource_id: 0,
            content: "hello".into(),
        });
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_non_http_url() {
        let mut request = base_request();
        request.website_urls.push(WebsiteUrl {
            datasource_id: 1,
            url: "ftp://example.com/file".into(),
        });
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_unknown_document_content_type() {
        let mut request = base_request();
        request.documents.push(DocumentMetadata {
            datasource_id: 1,
            url: "https://example.com/a".into(),
            download_url: "https://example.com/a?signed".into(),
            pathname: "a.bin".into(),
            content_type: "application/zip".into(),
            content_disposition: "attachment".into(),
        });
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn rejects_empty_qa_fields() {
        let mut request = base_request();
        request.qanda_data.push(QaPair {
            datasource_id: 1,
            question: "What is X?".into(),
            answer: "".into(),
            citations: None,
        });
        assert!(matches!(request.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn accepts_mixed_batch() {
        let mut request = base_request();
        request.qanda_data.push(QaPair {
            datasource_id: 7,
            question: "What is X?".into(),
            answer: "X is Y.".into(),
            citations: None,
        });
        request.text_content.push(TextContent {
            datasource_id: 8,
            content: "Hello world.".into(),
        });
        request.documents.push(DocumentMetadata {
            datasource_id: 9,
            url: "https://example.com/report.pdf".into(),
            download_url: "https://example.com/report.pdf?signed".into(),
            pathname: "report.pdf".into(),
            content_type: "application/pdf".into(),
            content_disposition: "attachment; filename=report.pdf".into(),
        });
        assert!(request.validate().is_ok());
        assert_eq!(request.total_sources(), 3);
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let raw = r#"{
            "userId": "u1",
            "chatbotId": "c1",
            "qandaData": [{"datasourceId": 7, "question": "Q", "answer": "A"}],
            "options": {"chunkSize": 500, "chunkOverlap": 50}
        }"#;
        let request: ProcessRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.qanda_data.len(), 1);
        assert_eq!(request.qanda_data[0].datasource_id, 7);
        let options = request.options.unwrap();
        assert_eq!(options.chunk_size, 500);
        assert_eq!(options.chunk_overlap, 50);
    }
}
