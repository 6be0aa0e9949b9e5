//! Document classification via the configured language model.
//!
//! The category set, default label, and prompt framing all come from
//! configuration. Whatever the model answers is normalized against the
//! closed category set; anything unrecognized resolves to the default
//! label, so the pipeline never sees a free-form category.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::config::ClassifierConfig;

const REQUEST_TIMEOUT_SECS: u64 = 120;

const SYSTEM_PROMPT: &str =
    "You classify documents. Respond with the exact category name only.";

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier transport error: {0}")]
    Transport(String),

    #[error("Classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Classifier response parsing failed: {0}")]
    ResponseParsing(String),

    #[error("Classifier returned an empty response")]
    EmptyResponse,
}

/// Classification, as consumed by the pipeline. The returned label is always
/// a member of the configured category set or the configured default.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, ClassifyError>;
}

/// HTTP client for the language-model generate endpoint.
pub struct LlmClassifier {
    config: ClassifierConfig,
    client: reqwest::Client,
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LlmClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Assemble the classification prompt from the configured framing text.
    fn build_prompt(&self, text: &str) -> String {
        let category_bullets = self
            .config
            .categories
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");

        let keyword_section = if self.config.keyword_rules.is_empty() {
            String::new()
        } else {
            let rules = self
                .config
                .keyword_rules
                .iter()
                .map(|r| format!("- {r}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("\nPay special attention to these keyword rules:\n{rules}\n")
        };

        format!(
            "{intro}\n\nCategories:\n{category_bullets}\n\n{instructions}\n{keyword_section}\n\
             If none of the above classifications match, return \"{default}\".\n\n\
             Document text:\n{body}",
            intro = self.config.prompt_intro,
            instructions = self.config.prompt_instructions,
            default = self.config.default_label,
            body = truncate_chars(text, self.config.max_input_chars),
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<String, ClassifyError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let prompt = self.build_prompt(text);
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: &prompt,
            system: SYSTEM_PROMPT,
            stream: false,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Status { status: status.as_u16(), body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::ResponseParsing(e.to_string()))?;

        if parsed.response.trim().is_empty() {
            return Err(ClassifyError::EmptyResponse);
        }

        let label = normalize_category(
            &parsed.response,
            &self.config.categories,
            &self.config.default_label,
        );
        tracing::info!(category = %label, "Document classified");
        Ok(label)
    }
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Map a raw model answer onto the closed category set.
///
/// Models wrap answers in quotes, backticks, or trailing punctuation; strip
/// that, take the first non-empty line, and match case-insensitively. No
/// match means the default label.
pub fn normalize_category(raw: &str, categories: &[String], default_label: &str) -> String {
    static EDGE_NOISE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"^["'`\s]+|["'`\s.]+$"#).expect("valid regex"));

    let candidate = raw
        .lines()
        .map(|line| EDGE_NOISE_RE.replace_all(line, "").to_string())
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if candidate.eq_ignore_ascii_case(default_label) {
        return default_label.to_string();
    }

    categories
        .iter()
        .find(|c| c.eq_ignore_ascii_case(&candidate))
        .cloned()
        .unwrap_or_else(|| default_label.to_string())
}
