//! Core data model: inbound fax records and terminal processing outcomes.

use serde::{Deserialize, Deserializer, Serialize};

/// One inbound fax event as reported by the provider's discovery listing.
///
/// Immutable once enqueued. Provider fields we don't interpret land in
/// `metadata` and ride along to the notification unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaxRecord {
    pub id: String,
    /// Originating sender identity. Empty when the provider has no name on
    /// file, which routes the fax down the full OCR path.
    #[serde(default, alias = "fromNameAddressBook")]
    pub sender: String,
    /// Receipt time, epoch seconds. Providers send this as either a number
    /// or a numeric string depending on API version.
    #[serde(alias = "time", deserialize_with = "epoch_secs_lenient")]
    pub received_at: i64,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Which route a fax took through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPath {
    /// Sender was in the mapping table; no OCR, no LLM.
    FastPath,
    /// Unknown sender: download both formats, extract, redact, classify.
    FullPath,
}

/// Pipeline stages, used for logging and degradation reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Extract,
    Redact,
    Classify,
    Notify,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Extract => "extract",
            Self::Redact => "redact",
            Self::Classify => "classify",
            Self::Notify => "notify",
        };
        write!(f, "{s}")
    }
}

/// What finally happened to the staged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Notification confirmed, staged file deleted.
    Cleaned,
    /// Notification not confirmed; staged file kept for operator follow-up.
    Retained,
    /// Notification dispatch itself failed, including the fallback attempt.
    Failed,
}

/// Terminal result of running the pipeline on one [`FaxRecord`].
///
/// Exactly one of these exists per processed record. `category` is always
/// populated — stage failures substitute the configured fallback label, and
/// a notification-construction failure substitutes the sentinel
/// "unresolved" label before the final dispatch attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub fax_id: String,
    pub category: String,
    pub path: ProcessingPath,
    /// Stages that failed and were recovered by fallback.
    pub degraded: Vec<Stage>,
    /// Entity count reported by the redactor, when redaction ran.
    pub redacted_entities: Option<u32>,
    pub disposition: Disposition,
}

/// Accept epoch seconds as an integer or a numeric string.
fn epoch_secs_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct EpochVisitor;

    impl serde::de::Visitor<'_> for EpochVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("epoch seconds as integer or numeric string")
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(E::custom)
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<i64, E> {
            v.trim().parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(EpochVisitor)
}
