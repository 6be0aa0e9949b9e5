//! Outbound notification routing.
//!
//! Every processed fax leaves the system as one email carrying the resolved
//! category and, when staging succeeded, the print-ready document. Categories
//! route to configured mailboxes with a default recipient for the rest.
//!
//! A reported failure (`Ok(false)`) is distinct from a transport error
//! (`Err`): the mail endpoint answered and declined, versus never answered.
//! The pipeline treats both as "not sent" but logs them differently.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::DateTime;

use crate::config::MailConfig;
use crate::models::FaxRecord;

const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Could not read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Notification dispatch, as consumed by the pipeline.
#[async_trait]
pub trait NotificationRouter: Send + Sync {
    /// Returns `Ok(true)` when the message was accepted for delivery,
    /// `Ok(false)` when the endpoint rejected it.
    async fn send(
        &self,
        category: &str,
        attachment: Option<&Path>,
        record: &FaxRecord,
    ) -> Result<bool, NotifyError>;
}

/// HTTP mail client posting JSON to the configured sendmail endpoint.
pub struct EmailNotifier {
    config: MailConfig,
    client: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(config: MailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, client }
    }

    /// Destination mailbox for a category.
    fn recipient_for(&self, category: &str) -> &str {
        self.config
            .recipients
            .get(category)
            .map(String::as_str)
            .unwrap_or(&self.config.default_recipient)
    }

    fn build_message(
        &self,
        category: &str,
        record: &FaxRecord,
        attachment: Option<(&str, &[u8])>,
    ) -> serde_json::Value {
        let received = DateTime::from_timestamp(record.received_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| record.received_at.to_string());

        let sender =
            if record.sender.is_empty() { "(unknown sender)" } else { record.sender.as_str() };

        let body = format!(
            "Fax {id} from {sender}\nReceived: {received}\nCategory: {category}\n\n\
             Provider metadata:\n{metadata}",
            id = record.id,
            metadata = serde_json::to_string_pretty(&record.metadata).unwrap_or_default(),
        );

        let attachments: Vec<serde_json::Value> = attachment
            .map(|(name, bytes)| {
                vec![serde_json::json!({
                    "name": name,
                    "contentType": "application/pdf",
                    "contentBytes": base64::engine::general_purpose::STANDARD.encode(bytes),
                })]
            })
            .unwrap_or_default();

        serde_json::json!({
            "from": self.config.from_address,
            "to": self.recipient_for(category),
            "subject": format!("Incoming fax {}: {category}", record.id),
            "body": body,
            "attachments": attachments,
        })
    }
}

#[async_trait]
impl NotificationRouter for EmailNotifier {
    async fn send(
        &self,
        category: &str,
        attachment: Option<&Path>,
        record: &FaxRecord,
    ) -> Result<bool, NotifyError> {
        let attachment_bytes = match attachment {
            Some(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|source| {
                    NotifyError::Attachment { path: path.display().to_string(), source }
                })?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("fax_{}.pdf", record.id));
                Some((name, bytes))
            }
            None => None,
        };

        let message = self.build_message(
            category,
            record,
            attachment_bytes.as_ref().map(|(n, b)| (n.as_str(), b.as_slice())),
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.access_token)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                fax_id = record.id,
                category,
                recipient = self.recipient_for(category),
                "Notification sent"
            );
            Ok(true)
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                fax_id = record.id,
                category,
                status = status.as_u16(),
                body,
                "Mail endpoint rejected notification"
            );
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn mail_config() -> MailConfig {
        MailConfig {
            endpoint: "https://mail.example.com/send".into(),
            access_token: "token".into(),
            from_address: "fax@example.com".into(),
            recipients: HashMap::from([("LabResult".to_string(), "lab@example.com".to_string())]),
            default_recipient: "intake@example.com".into(),
        }
    }

    fn record() -> FaxRecord {
        serde_json::from_str(
            r#"{"id": "123", "fromNameAddressBook": "ClinicA", "time": 1722945600, "pageCount": 2}"#,
        )
        .unwrap()
    }

    #[test]
    fn mapped_category_routes_to_mapped_mailbox() {
        let notifier = EmailNotifier::new(mail_config());
        assert_eq!(notifier.recipient_for("LabResult"), "lab@example.com");
    }

    #[test]
    fn unmapped_category_routes_to_default() {
        let notifier = EmailNotifier::new(mail_config());
        assert_eq!(notifier.recipient_for("Referral"), "intake@example.com");
        assert_eq!(notifier.recipient_for("Uncategorized"), "intake@example.com");
    }

    #[test]
    fn message_carries_subject_recipient_and_metadata() {
        let notifier = EmailNotifier::new(mail_config());
        let message = notifier.build_message("LabResult", &record(), None);

        assert_eq!(message["subject"], "Incoming fax 123: LabResult");
        assert_eq!(message["to"], "lab@example.com");
        assert_eq!(message["from"], "fax@example.com");
        let body = message["body"].as_str().unwrap();
        assert!(body.contains("ClinicA"));
        assert!(body.contains("2024-08-06"));
        assert!(body.contains("pageCount"));
        assert!(message["attachments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn attachment_is_base64_encoded() {
        let notifier = EmailNotifier::new(mail_config());
        let message =
            notifier.build_message("LabResult", &record(), Some(("fax_123.pdf", b"%PDF-1.4")));

        let attachments = message["attachments"].as_array().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0]["name"], "fax_123.pdf");
        assert_eq!(
            attachments[0]["contentBytes"],
            base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4")
        );
    }

    #[test]
    fn empty_sender_rendered_as_unknown() {
        let notifier = EmailNotifier::new(mail_config());
        let record: FaxRecord = serde_json::from_str(r#"{"id": "9", "time": 1}"#).unwrap();
        let message = notifier.build_message("Uncategorized", &record, None);
        assert!(message["body"].as_str().unwrap().contains("(unknown sender)"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let mut config = mail_config();
        config.endpoint = "http://127.0.0.1:1/send".into();
        let notifier = EmailNotifier::new(config);
        let result = notifier.send("LabResult", None, &record()).await;
        assert!(matches!(result, Err(NotifyError::Transport(_))));
    }

    #[tokio::test]
    async fn missing_attachment_file_is_attachment_error() {
        let notifier = EmailNotifier::new(mail_config());
        let missing = Path::new("/nonexistent/fax_123.pdf");
        let result = notifier.send("LabResult", Some(missing), &record()).await;
        assert!(matches!(result, Err(NotifyError::Attachment { .. })));
    }
}
