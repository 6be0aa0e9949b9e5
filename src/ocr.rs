//! Text extraction — bridges the pipeline to the external OCR service.
//!
//! The service consumes the image-format document and returns per-page text;
//! this client concatenates pages with an explicit break marker so downstream
//! classification sees page boundaries. Any service-side failure surfaces as
//! a single [`ExtractError`].

use async_trait::async_trait;
use serde::Deserialize;

/// Marker inserted between pages of the extracted text.
pub const PAGE_BREAK_MARKER: &str = "\n\n=== PAGE BREAK ===\n\n";

const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("OCR transport error: {0}")]
    Transport(String),

    #[error("OCR service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("OCR response parsing failed: {0}")]
    ResponseParsing(String),

    #[error("OCR produced no text")]
    EmptyDocument,
}

/// Text extraction, as consumed by the pipeline.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<String, ExtractError>;
}

/// HTTP client for the OCR sidecar service.
///
/// `POST {endpoint}/extract` with the raw document bytes; the response is
/// `{"pages": ["...", ...]}` in page order.
pub struct HttpTextExtractor {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ExtractResponse {
    pages: Vec<String>,
}

impl HttpTextExtractor {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { endpoint: endpoint.trim_end_matches('/').to_string(), client }
    }
}

#[async_trait]
impl TextExtractor for HttpTextExtractor {
    async fn extract(&self, image: &[u8]) -> Result<String, ExtractError> {
        let url = format!("{}/extract", self.endpoint);
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Status { status: status.as_u16(), body });
        }

        let parsed: ExtractResponse = response
            .json()
            .await
            .map_err(|e| ExtractError::ResponseParsing(e.to_string()))?;

        let text = join_pages(&parsed.pages);
        if text.is_empty() {
            return Err(ExtractError::EmptyDocument);
        }

        tracing::info!(
            pages = parsed.pages.len(),
            text_len = text.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            "OCR extraction complete"
        );
        Ok(text)
    }
}

/// Join page texts with the break marker, trimming each page.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_single_page_has_no_marker() {
        let text = join_pages(&["  hello world  ".into()]);
        assert_eq!(text, "hello world");
        assert!(!text.contains("PAGE BREAK"));
    }

    #[test]
    fn join_multiple_pages_inserts_marker() {
        let text = join_pages(&["page one".into(), "page two".into()]);
        assert_eq!(text, "page one\n\n=== PAGE BREAK ===\n\npage two");
    }

    #[test]
    fn join_skips_blank_pages() {
        let text = join_pages(&["first".into(), "   ".into(), "third".into()]);
        assert_eq!(text.matches("=== PAGE BREAK ===").count(), 1);
        assert!(text.contains("first"));
        assert!(text.contains("third"));
    }

    #[test]
    fn join_empty_input_is_empty() {
        assert!(join_pages(&[]).is_empty());
    }

    #[test]
    fn extract_response_parses() {
        let parsed: ExtractResponse =
            serde_json::from_str(r#"{"pages": ["a", "b"]}"#).unwrap();
        assert_eq!(parsed.pages, vec!["a", "b"]);
    }
}
