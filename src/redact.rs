//! PHI redaction — replaces sensitive entities with typed placeholders.
//!
//! Backed by an external entity-recognition service. The contract with the
//! pipeline is deliberately infallible: [`PhiRedactor::redact`] always
//! returns usable text. When the service is unreachable or returns garbage,
//! the original text comes back with `degraded = true` and an entity count
//! of zero, and the pipeline proceeds with unredacted text.

use async_trait::async_trait;
use serde::Deserialize;

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Entity categories the redactor recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiEntityKind {
    Person,
    PhoneNumber,
    EmailAddress,
    DateTime,
    Address,
    GovernmentId,
    MedicalId,
    Organization,
    IpAddress,
    FinancialId,
    #[serde(other)]
    Unknown,
}

impl PhiEntityKind {
    /// Placeholder substituted for a detected span.
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Person => "<PERSON>",
            Self::PhoneNumber => "<PHONE_NUMBER>",
            Self::EmailAddress => "<EMAIL_ADDRESS>",
            Self::DateTime => "<DATE_TIME>",
            Self::Address => "<ADDRESS>",
            Self::GovernmentId => "<GOVERNMENT_ID>",
            Self::MedicalId => "<MEDICAL_ID>",
            Self::Organization => "<ORGANIZATION>",
            Self::IpAddress => "<IP_ADDRESS>",
            Self::FinancialId => "<FINANCIAL_ID>",
            Self::Unknown => "<REDACTED>",
        }
    }
}

/// One detected entity span, byte-offset addressed.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitySpan {
    pub kind: PhiEntityKind,
    pub start: usize,
    pub end: usize,
}

/// Result of a redaction pass. Never an error.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    pub text: String,
    pub entity_count: u32,
    /// True when the recognition service failed and the text is unredacted.
    pub degraded: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("Redactor transport error: {0}")]
    Transport(String),

    #[error("Redactor returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Redactor response parsing failed: {0}")]
    ResponseParsing(String),
}

/// PHI redaction, as consumed by the pipeline.
#[async_trait]
pub trait PhiRedactor: Send + Sync {
    async fn redact(&self, text: &str) -> RedactionOutcome;
}

/// HTTP client for the entity-recognition service.
///
/// `POST {endpoint}/analyze` with `{"text": ...}`; the response is
/// `{"entities": [{"kind", "start", "end"}, ...]}`.
pub struct HttpPhiRedactor {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    entities: Vec<EntitySpan>,
}

impl HttpPhiRedactor {
    pub fn new(endpoint: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { endpoint: endpoint.trim_end_matches('/').to_string(), client }
    }

    async fn analyze(&self, text: &str) -> Result<Vec<EntitySpan>, RedactError> {
        let url = format!("{}/analyze", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| RedactError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedactError::Status { status: status.as_u16(), body });
        }

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| RedactError::ResponseParsing(e.to_string()))?;

        Ok(parsed.entities)
    }
}

#[async_trait]
impl PhiRedactor for HttpPhiRedactor {
    async fn redact(&self, text: &str) -> RedactionOutcome {
        match self.analyze(text).await {
            Ok(spans) => {
                let (redacted, applied) = apply_spans(text, spans);
                tracing::info!(entities = applied, "PHI redaction complete");
                RedactionOutcome { text: redacted, entity_count: applied, degraded: false }
            }
            Err(e) => {
                // Contract: a redactor failure must never block the pipeline.
                tracing::warn!(error = %e, "PHI redaction failed, using unredacted text");
                RedactionOutcome { text: text.to_string(), entity_count: 0, degraded: true }
            }
        }
    }
}

/// Replace detected spans with placeholders. Spans with invalid bounds or
/// overlapping an already-accepted span are dropped rather than corrupting
/// the text. Returns the redacted text and the number of spans applied.
fn apply_spans(text: &str, mut spans: Vec<EntitySpan>) -> (String, u32) {
    spans.sort_by_key(|s| (s.start, s.end));

    let mut accepted: Vec<EntitySpan> = Vec::with_capacity(spans.len());
    for span in spans {
        let valid = span.start < span.end
            && span.end <= text.len()
            && text.is_char_boundary(span.start)
            && text.is_char_boundary(span.end)
            && accepted.last().map_or(true, |prev| span.start >= prev.end);
        if valid {
            accepted.push(span);
        }
    }

    let mut result = text.to_string();
    for span in accepted.iter().rev() {
        result.replace_range(span.start..span.end, span.kind.placeholder());
    }
    (result, accepted.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(kind: PhiEntityKind, start: usize, end: usize) -> EntitySpan {
        EntitySpan { kind, start, end }
    }

    #[test]
    fn replaces_single_span() {
        let (text, count) = apply_spans(
            "Patient John Smith presented today",
            vec![span(PhiEntityKind::Person, 8, 18)],
        );
        assert_eq!(text, "Patient <PERSON> presented today");
        assert_eq!(count, 1);
    }

    #[test]
    fn replaces_multiple_spans_in_order() {
        let (text, count) = apply_spans(
            "Call 555-0100 or mail a@b.com",
            vec![
                span(PhiEntityKind::EmailAddress, 22, 29),
                span(PhiEntityKind::PhoneNumber, 5, 13),
            ],
        );
        assert_eq!(text, "Call <PHONE_NUMBER> or mail <EMAIL_ADDRESS>");
        assert_eq!(count, 2);
    }

    #[test]
    fn drops_out_of_bounds_span() {
        let (text, count) = apply_spans("short", vec![span(PhiEntityKind::Person, 2, 50)]);
        assert_eq!(text, "short");
        assert_eq!(count, 0);
    }

    #[test]
    fn drops_overlapping_span() {
        let (text, count) = apply_spans(
            "John Smith Jr",
            vec![
                span(PhiEntityKind::Person, 0, 10),
                span(PhiEntityKind::Person, 5, 13),
            ],
        );
        assert_eq!(text, "<PERSON> Jr");
        assert_eq!(count, 1);
    }

    #[test]
    fn drops_span_off_char_boundary() {
        // "é" is two bytes; offset 1 splits it.
        let (text, count) = apply_spans("émile", vec![span(PhiEntityKind::Person, 1, 3)]);
        assert_eq!(text, "émile");
        assert_eq!(count, 0);
    }

    #[test]
    fn unknown_kind_uses_generic_placeholder() {
        let parsed: EntitySpan =
            serde_json::from_str(r#"{"kind": "crypto_wallet", "start": 0, "end": 1}"#).unwrap();
        assert_eq!(parsed.kind.placeholder(), "<REDACTED>");
    }

    #[test]
    fn entity_kinds_deserialize_snake_case() {
        let parsed: EntitySpan =
            serde_json::from_str(r#"{"kind": "phone_number", "start": 0, "end": 4}"#).unwrap();
        assert!(matches!(parsed.kind, PhiEntityKind::PhoneNumber));
    }

    #[tokio::test]
    async fn service_failure_degrades_instead_of_erroring() {
        // Nothing listens on this port; the connect error must come back as
        // a degraded outcome carrying the original text.
        let redactor = HttpPhiRedactor::new("http://127.0.0.1:1");
        let outcome = redactor.redact("Patient John Smith").await;
        assert!(outcome.degraded);
        assert_eq!(outcome.text, "Patient John Smith");
        assert_eq!(outcome.entity_count, 0);
    }
}
