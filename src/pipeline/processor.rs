//! The fax processing pipeline.
//!
//! One call to [`FaxPipeline::process`] takes a queued record through
//! fetch → (fast classify | extract → redact → classify) → notify → cleanup
//! and always terminates in exactly one [`ProcessingOutcome`]. Stage
//! failures never propagate: each is logged with the fax id and stage, then
//! converted to the configured fallback category so the record still reaches
//! notification. The one non-recoverable stage is notification itself, which
//! gets a single extra attempt under the sentinel category before the record
//! is declared failed.
//!
//! Stage flow per record:
//! `Queued → Fetching → {FastClassify | Extracting → Redacting? → Classifying}
//!  → Notifying → {Cleaned | Retained | Failed}`

use std::path::PathBuf;
use std::sync::Arc;

use crate::classify::Classifier;
use crate::fetch::{FaxFetcher, FaxFormat};
use crate::models::{Disposition, FaxRecord, ProcessingOutcome, ProcessingPath, Stage};
use crate::notify::NotificationRouter;
use crate::ocr::TextExtractor;
use crate::redact::PhiRedactor;

use super::sender_map::SenderMap;
use super::staging::StagingArea;

/// Sentinel category used when notification construction itself fails and
/// the fax is routed on a best-effort final attempt.
pub const UNRESOLVED_CATEGORY: &str = "Unresolved";

/// Intermediate resolution before the notification phase.
struct ResolvedFax {
    category: String,
    path: ProcessingPath,
    degraded: Vec<Stage>,
    redacted_entities: Option<u32>,
    artifact: Option<PathBuf>,
}

/// The pipeline instance. Explicitly constructed and handed to whatever owns
/// the process lifecycle — no global state, no startup hooks.
pub struct FaxPipeline {
    sender_map: Arc<SenderMap>,
    staging: StagingArea,
    fetcher: Arc<dyn FaxFetcher>,
    extractor: Arc<dyn TextExtractor>,
    redactor: Option<Arc<dyn PhiRedactor>>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn NotificationRouter>,
    fallback_label: String,
}

impl FaxPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender_map: Arc<SenderMap>,
        staging: StagingArea,
        fetcher: Arc<dyn FaxFetcher>,
        extractor: Arc<dyn TextExtractor>,
        redactor: Option<Arc<dyn PhiRedactor>>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn NotificationRouter>,
        fallback_label: String,
    ) -> Self {
        Self {
            sender_map,
            staging,
            fetcher,
            extractor,
            redactor,
            classifier,
            notifier,
            fallback_label,
        }
    }

    /// Run one fax to a terminal outcome. Never returns an error and never
    /// skips the notification attempt.
    pub async fn process(&self, record: &FaxRecord) -> ProcessingOutcome {
        tracing::info!(fax_id = record.id, sender = record.sender, "Processing fax");

        let mut resolved = match self.sender_map.lookup(&record.sender) {
            Some(mapped) => self.fast_path(record, mapped).await,
            None => self.full_path(record).await,
        };

        let disposition = self.notify_and_clean(record, &mut resolved).await;

        let outcome = ProcessingOutcome {
            fax_id: record.id.clone(),
            category: resolved.category,
            path: resolved.path,
            degraded: resolved.degraded,
            redacted_entities: resolved.redacted_entities,
            disposition,
        };
        tracing::info!(
            fax_id = outcome.fax_id,
            category = outcome.category,
            disposition = ?outcome.disposition,
            "Fax processing complete"
        );
        outcome
    }

    /// Known sender: the mapped category is the classification; only the
    /// print-ready document is downloaded. A failed fetch falls back to the
    /// default label and proceeds to notification without an attachment.
    async fn fast_path(&self, record: &FaxRecord, mapped: &str) -> ResolvedFax {
        tracing::info!(fax_id = record.id, category = mapped, "Known sender, fast path");
        let mut resolved = ResolvedFax {
            category: mapped.to_string(),
            path: ProcessingPath::FastPath,
            degraded: Vec::new(),
            redacted_entities: None,
            artifact: None,
        };

        match self.fetcher.fetch(&record.id, FaxFormat::Print).await {
            Ok(bytes) => match self.staging.stage(&record.id, record.received_at, &bytes).await {
                Ok(path) => resolved.artifact = Some(path),
                Err(e) => {
                    tracing::warn!(
                        fax_id = record.id, stage = %Stage::Fetch, error = %e,
                        "Staging failed, using fallback category"
                    );
                    resolved.degraded.push(Stage::Fetch);
                    resolved.category = self.fallback_label.clone();
                }
            },
            Err(e) => {
                tracing::warn!(
                    fax_id = record.id, stage = %Stage::Fetch, error = %e,
                    "Print download failed, using fallback category"
                );
                resolved.degraded.push(Stage::Fetch);
                resolved.category = self.fallback_label.clone();
            }
        }
        resolved
    }

    /// Unknown sender: download both representations, extract text, redact
    /// when enabled, classify. The category starts as the fallback label and
    /// is only replaced by a successful classification, so every failure
    /// point simply returns early with the fallback in place.
    async fn full_path(&self, record: &FaxRecord) -> ResolvedFax {
        let mut resolved = ResolvedFax {
            category: self.fallback_label.clone(),
            path: ProcessingPath::FullPath,
            degraded: Vec::new(),
            redacted_entities: None,
            artifact: None,
        };

        let image = self.fetcher.fetch(&record.id, FaxFormat::Image).await;
        let print = self.fetcher.fetch(&record.id, FaxFormat::Print).await;

        // Stage the print document first: even when the rest of the pipeline
        // degrades, the notification should carry whatever was obtained.
        let mut fetch_failed = false;
        match print {
            Ok(bytes) => match self.staging.stage(&record.id, record.received_at, &bytes).await {
                Ok(path) => resolved.artifact = Some(path),
                Err(e) => {
                    tracing::warn!(fax_id = record.id, stage = %Stage::Fetch, error = %e, "Staging failed");
                    fetch_failed = true;
                }
            },
            Err(e) => {
                tracing::warn!(fax_id = record.id, stage = %Stage::Fetch, error = %e, "Print download failed");
                fetch_failed = true;
            }
        }

        let image_bytes = match image {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(fax_id = record.id, stage = %Stage::Fetch, error = %e, "Image download failed");
                fetch_failed = true;
                None
            }
        };

        let image_bytes = match (fetch_failed, image_bytes) {
            (false, Some(bytes)) => bytes,
            _ => {
                resolved.degraded.push(Stage::Fetch);
                return resolved;
            }
        };

        let raw_text = match self.extractor.extract(&image_bytes).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    fax_id = record.id, stage = %Stage::Extract, error = %e,
                    "Text extraction failed, using fallback category"
                );
                resolved.degraded.push(Stage::Extract);
                return resolved;
            }
        };

        let text = match &self.redactor {
            Some(redactor) => {
                let outcome = redactor.redact(&raw_text).await;
                if outcome.degraded {
                    tracing::warn!(
                        fax_id = record.id, stage = %Stage::Redact,
                        "Redaction degraded, continuing with unredacted text"
                    );
                    resolved.degraded.push(Stage::Redact);
                } else {
                    resolved.redacted_entities = Some(outcome.entity_count);
                }
                outcome.text
            }
            None => raw_text,
        };

        match self.classifier.classify(&text).await {
            Ok(category) => resolved.category = category,
            Err(e) => {
                tracing::warn!(
                    fax_id = record.id, stage = %Stage::Classify, error = %e,
                    "Classification failed, using fallback category"
                );
                resolved.degraded.push(Stage::Classify);
            }
        }
        resolved
    }

    /// Exactly one primary notification attempt. When that attempt errors
    /// (as opposed to reporting a rejection), one extra attempt goes out
    /// under the sentinel category; its failure is terminal for the record.
    /// The staged file is deleted only on a confirmed send.
    async fn notify_and_clean(
        &self,
        record: &FaxRecord,
        resolved: &mut ResolvedFax,
    ) -> Disposition {
        let attachment = resolved.artifact.clone();

        match self.notifier.send(&resolved.category, attachment.as_deref(), record).await {
            Ok(true) => self.clean(record, resolved).await,
            Ok(false) => {
                tracing::warn!(
                    fax_id = record.id, category = resolved.category,
                    "Notification rejected, staged file retained"
                );
                Disposition::Retained
            }
            Err(e) => {
                tracing::error!(
                    fax_id = record.id, stage = %Stage::Notify, error = %e,
                    "Notification attempt failed, retrying under sentinel category"
                );
                resolved.degraded.push(Stage::Notify);
                resolved.category = UNRESOLVED_CATEGORY.to_string();

                match self.notifier.send(UNRESOLVED_CATEGORY, attachment.as_deref(), record).await {
                    Ok(true) => self.clean(record, resolved).await,
                    Ok(false) => {
                        tracing::error!(
                            fax_id = record.id,
                            "Sentinel notification rejected, staged file retained"
                        );
                        Disposition::Retained
                    }
                    Err(e) => {
                        tracing::error!(
                            fax_id = record.id, error = %e,
                            "Sentinel notification failed, giving up on record"
                        );
                        Disposition::Failed
                    }
                }
            }
        }
    }

    async fn clean(&self, record: &FaxRecord, resolved: &ResolvedFax) -> Disposition {
        if let Some(path) = &resolved.artifact {
            if let Err(e) = self.staging.remove(path).await {
                // The notification went out; a leftover file is the
                // sweeper's problem, not a processing failure.
                tracing::warn!(
                    fax_id = record.id, path = %path.display(), error = %e,
                    "Failed to delete staged file"
                );
            }
        }
        Disposition::Cleaned
    }
}
