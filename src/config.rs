//! Environment-sourced configuration, validated once at startup.
//!
//! Every collaborator gets a typed sub-config. Missing required variables and
//! malformed mapping lists are startup errors — the service refuses to boot
//! with a partial configuration rather than discovering the gap mid-pipeline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::sender_map::SenderMap;

/// Application-level constants
pub const APP_NAME: &str = "Faxtriage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("info,{}=info", env!("CARGO_PKG_NAME"))
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },

    #[error("Malformed mapping entry in {name}: {entry:?} (expected key:value)")]
    MalformedMapping { name: &'static str, entry: String },

    #[error("Duplicate mapping key in {name}: {key:?}")]
    DuplicateMapping { name: &'static str, key: String },
}

/// Fax provider API access (polling + download).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
    /// Inbound number the poller filters on.
    pub to_number: u64,
}

/// PHI redaction stage configuration.
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub enabled: bool,
    /// Entity-recognition service endpoint. Required only when enabled.
    pub endpoint: Option<String>,
}

/// LLM classification configuration. The category set, default label and all
/// prompt framing text come from the environment — nothing is hard-coded.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub categories: Vec<String>,
    pub default_label: String,
    pub prompt_intro: String,
    pub prompt_instructions: String,
    pub keyword_rules: Vec<String>,
    /// Character budget for document text sent to the model.
    pub max_input_chars: usize,
}

/// Outbound mail routing configuration.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub endpoint: String,
    pub access_token: String,
    pub from_address: String,
    /// Category → destination mailbox.
    pub recipients: HashMap<String, String>,
    /// Used for categories without an explicit mapping.
    pub default_recipient: String,
}

/// Top-level configuration assembled from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub poll_interval: Duration,
    pub sender_map: SenderMap,
    pub redaction: RedactionConfig,
    pub ocr_endpoint: String,
    pub classifier: ClassifierConfig,
    pub mail: MailConfig,
    pub staging_dir: PathBuf,
    /// Staged files older than this are reclaimed by the retention sweeper.
    pub staging_retention: Duration,
    pub sweep_interval: Duration,
    pub health_port: u16,
}

const DEFAULT_PROMPT_INTRO: &str = "Based on the provided text, classify the \
associated document by selecting only one of the following categories";

const DEFAULT_PROMPT_INSTRUCTIONS: &str = "Your response should be the exact \
name of the classification from the list above, and nothing more. Do not \
include any explanations or additional text.";

impl AppConfig {
    /// Load and validate configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source. Seam for tests.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = ProviderConfig {
            base_url: require(&get, "FAX_API_BASE_URL")?,
            access_key: require(&get, "FAX_ACCESS_KEY")?,
            secret_key: require(&get, "FAX_SECRET_KEY")?,
            to_number: parse_required(&get, "FAX_TO_NUMBER")?,
        };

        let poll_interval = Duration::from_secs(parse_or(&get, "POLL_INTERVAL_SECS", 60)?);

        let sender_pairs =
            parse_mapping_list("SENDER_MAPPINGS", &get("SENDER_MAPPINGS").unwrap_or_default())?;
        let sender_map = SenderMap::new(sender_pairs)
            .map_err(|key| ConfigError::DuplicateMapping { name: "SENDER_MAPPINGS", key })?;

        let redaction_enabled = parse_bool(&get, "REDACTION_ENABLED", false)?;
        let redaction = RedactionConfig {
            enabled: redaction_enabled,
            endpoint: if redaction_enabled {
                Some(require(&get, "REDACTOR_URL")?)
            } else {
                get("REDACTOR_URL")
            },
        };

        let categories: Vec<String> = split_list(&require(&get, "CLASSIFICATION_CATEGORIES")?);
        if categories.is_empty() {
            return Err(ConfigError::InvalidVar {
                name: "CLASSIFICATION_CATEGORIES",
                reason: "category set must not be empty".into(),
            });
        }

        let classifier = ClassifierConfig {
            endpoint: require(&get, "CLASSIFIER_URL")?,
            model: require(&get, "CLASSIFIER_MODEL")?,
            api_key: get("CLASSIFIER_API_KEY"),
            categories,
            default_label: get("DEFAULT_CATEGORY").unwrap_or_else(|| "Uncategorized".into()),
            prompt_intro: get("PROMPT_INTRO").unwrap_or_else(|| DEFAULT_PROMPT_INTRO.into()),
            prompt_instructions: get("PROMPT_INSTRUCTIONS")
                .unwrap_or_else(|| DEFAULT_PROMPT_INSTRUCTIONS.into()),
            keyword_rules: split_list(&get("KEYWORD_RULES").unwrap_or_default()),
            max_input_chars: parse_or(&get, "CLASSIFIER_MAX_INPUT_CHARS", 4000)? as usize,
        };

        let mail_pairs = parse_mapping_list("MAIL_MAPPINGS", &require(&get, "MAIL_MAPPINGS")?)?;
        let mut recipients = HashMap::new();
        for (category, address) in mail_pairs {
            if recipients.insert(category.clone(), address).is_some() {
                return Err(ConfigError::DuplicateMapping { name: "MAIL_MAPPINGS", key: category });
            }
        }

        let mail = MailConfig {
            endpoint: require(&get, "MAIL_ENDPOINT")?,
            access_token: require(&get, "MAIL_ACCESS_TOKEN")?,
            from_address: require(&get, "MAIL_FROM")?,
            recipients,
            default_recipient: require(&get, "MAIL_DEFAULT_RECIPIENT")?,
        };

        Ok(Self {
            provider,
            poll_interval,
            sender_map,
            redaction,
            ocr_endpoint: require(&get, "OCR_URL")?,
            classifier,
            mail,
            staging_dir: PathBuf::from(get("STAGING_DIR").unwrap_or_else(|| "tmp".into())),
            staging_retention: Duration::from_secs(parse_or(&get, "STAGING_RETENTION_SECS", 3600)?),
            sweep_interval: Duration::from_secs(parse_or(&get, "SWEEP_INTERVAL_SECS", 1800)?),
            health_port: parse_or(&get, "PORT", 8000)? as u16,
        })
    }
}

fn require(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match get(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn parse_required(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<u64, ConfigError> {
    require(get, name)?
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidVar { name, reason: format!("{e}") })
}

fn parse_or(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match get(name) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidVar { name, reason: format!("{e}") }),
        None => Ok(default),
    }
}

fn parse_bool(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match get(name) {
        Some(v) => match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidVar {
                name,
                reason: format!("expected boolean, got {other:?}"),
            }),
        },
        None => Ok(default),
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `key:value,key:value` list. Malformed entries are an error, not a
/// skip — a silently dropped mapping would reroute faxes without warning.
pub fn parse_mapping_list(
    name: &'static str,
    raw: &str,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                pairs.push((key.trim().to_string(), value.trim().to_string()));
            }
            _ => {
                return Err(ConfigError::MalformedMapping { name, entry: entry.to_string() });
            }
        }
    }
    Ok(pairs)
}
