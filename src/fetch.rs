//! Fax provider API client — document download and inbox discovery.
//!
//! The pipeline consumes downloads through the [`FaxFetcher`] trait; the
//! poller consumes the discovery listing through [`FaxSource`]. Both are
//! implemented by [`HttpFaxFetcher`] against the provider's REST API with
//! basic-auth credentials.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::models::FaxRecord;

/// Request timeout for provider calls. Downloads are multi-page TIFFs, so
/// this is generous compared to the JSON endpoints.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Which representation of a fax to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaxFormat {
    /// OCR-suitable image representation (multi-page TIFF).
    Image,
    /// Print-ready representation attached to outbound notifications (PDF).
    Print,
}

impl FaxFormat {
    /// Value of the provider's `fileFormat` query parameter.
    pub fn as_query(self) -> &'static str {
        match self {
            Self::Image => "tiff",
            Self::Print => "pdf",
        }
    }

    /// File extension for staged artifacts in this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "tiff",
            Self::Print => "pdf",
        }
    }
}

impl std::fmt::Display for FaxFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_query())
    }
}

/// Errors from the provider API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider response parsing failed: {0}")]
    ResponseParsing(String),
}

/// Document download, as consumed by the pipeline.
#[async_trait]
pub trait FaxFetcher: Send + Sync {
    async fn fetch(&self, fax_id: &str, format: FaxFormat) -> Result<Vec<u8>, FetchError>;
}

/// Inbox discovery, as consumed by the poller.
#[async_trait]
pub trait FaxSource: Send + Sync {
    /// List faxes received in the `[time_from, time_to]` epoch-second window.
    async fn list_incoming(&self, time_from: i64, time_to: i64)
        -> Result<Vec<FaxRecord>, FetchError>;
}

/// HTTP client for the fax provider REST API.
pub struct HttpFaxFetcher {
    base_url: String,
    access_key: String,
    secret_key: String,
    to_number: u64,
    client: reqwest::Client,
}

impl HttpFaxFetcher {
    pub fn new(config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            to_number: config.to_number,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Provider listing envelope: `{"data": {"incomingFaxes": [...]}}`.
#[derive(Deserialize)]
struct ListEnvelope {
    data: ListData,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default, rename = "incomingFaxes")]
    incoming_faxes: Vec<FaxRecord>,
}

#[async_trait]
impl FaxFetcher for HttpFaxFetcher {
    async fn fetch(&self, fax_id: &str, format: FaxFormat) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/incomingFax/{fax_id}/download", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("fileFormat", format.as_query())])
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        tracing::info!(fax_id, %format, size = bytes.len(), "Fax downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FaxSource for HttpFaxFetcher {
    async fn list_incoming(
        &self,
        time_from: i64,
        time_to: i64,
    ) -> Result<Vec<FaxRecord>, FetchError> {
        let url = format!("{}/incomingFaxes", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("timeFrom", time_from.to_string()),
                ("timeTo", time_to.to_string()),
                ("toNumber", self.to_number.to_string()),
            ])
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        let envelope: ListEnvelope = response
            .json()
            .await
            .map_err(|e| FetchError::ResponseParsing(e.to_string()))?;

        Ok(envelope.data.incoming_faxes)
    }
}
