use std::time::Duration;

use bytes::BytesMut;
use common::error::DownloadError;
use common::types::request::ALLOWED_DOCUMENT_CONTENT_TYPES;
use tracing::{debug, warn};

/// Upper bound on a downloaded document body.
pub const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;
/// Whole-download deadline.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// A fetched document body plus the content type the origin reported.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Bounded HTTP fetcher for signed document URLs. Follows redirects,
/// enforces the size cap while streaming, and rejects bodies whose
/// content type matches neither the expected family nor the allowed set.
#[derive(Clone)]
pub struct FileDownloader {
    client: reqwest::Client,
}

impl Default for FileDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl FileDownloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .expect("failed to build download client");
        Self { client }
    }

    pub async fn download(
        &self,
        url: &str,
        expected_content_type: &str,
    ) -> Result<DownloadedFile, DownloadError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| DownloadError::Transport(format!("invalid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                warn!(%url, %scheme, "Rejected download URL with unsupported scheme");
                return Err(DownloadError::Transport(format!(
                    "unsupported URL scheme: {scheme}"
                )));
            }
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type_acceptable(&content_type, expected_content_type) {
            return Err(DownloadError::BadContentType(content_type));
        }

        if let Some(length) = response.content_length() {
            if length > MAX_DOWNLOAD_BYTES {
                return Err(DownloadError::TooLarge(MAX_DOWNLOAD_BYTES));
            }
        }

        // The advertised length is not trusted; the cap is enforced while
        // the body streams in.
        let mut body = BytesMut::new();
        let mut response = response;
        while let Some(chunk) = response.chunk().await.map_err(classify_reqwest_error)? {
            if body.len() as u64 + chunk.len() as u64 > MAX_DOWNLOAD_BYTES {
                return Err(DownloadError::TooLarge(MAX_DOWNLOAD_BYTES));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(%url, bytes = body.len(), %content_type, "Downloaded document");

        Ok(DownloadedFile {
            content: body.to_vec(),
            content_type,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> DownloadError {
    if err.is_timeout() {
        DownloadError::Timeout(DOWNLOAD_TIMEOUT_SECS)
    } else {
        DownloadError::Transport(err.to_string())
    }
}

/// The received content type is acceptable when it starts with the
/// expected family (parameters like `; charset=utf-8` ignored) or is in
/// the allowed document MIME set. A missing header passes: some signed
/// URL origins omit it and the decoder factory falls back on the file
/// suffix.
fn content_type_acceptable(received: &str, expected: &str) -> bool {
    if received.is_empty() {
        return true;
    }
    let received = received.to_ascii_lowercase();
    let expected = expected.to_ascii_lowercase();

    let expected_family = expected.split('/').next().unwrap_or_default();
    if !expected.is_empty() && received.starts_with(expected_family) {
        return true;
    }

    ALLOWED_DOCUMENT_CONTENT_TYPES
        .iter()
        .any(|allowed| received.starts_with(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_and_parameterised_content_types() {
        assert!(content_type_acceptable("application/pdf", "application/pdf"));
        assert!(content_type_acceptable(
            "text/csv; charset=utf-8",
            "text/csv"
        ));
    }

    #[test]
    fn accepts_same_family() {
        assert!(content_type_acceptable("text/plain", "text/csv"));
    }

    #[test]
    fn accepts_allowed_set_regardless_of_expectation() {
        assert!(content_type_acceptable("application/pdf", "text/plain"));
    }

    #[test]
    fn rejects_unrelated_content_type() {
        assert!(!content_type_acceptable("image/png", "application/pdf"));
    }

    #[test]
    fn missing_header_passes_through() {
        assert!(content_type_acceptable("", "application/pdf"));
    }

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        let downloader = FileDownloader::new();
        let result = downloader
            .download("ftp://example.com/file.pdf", "application/pdf")
            .await;
        assert!(matches!(result, Err(DownloadError::Transport(_))));
    }
}
