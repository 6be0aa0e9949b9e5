//! Faxtriage — fax intake, classification, and routing service.
//!
//! A poller discovers inbound faxes at the provider and feeds a FIFO queue;
//! a single pipeline worker drains it, classifying each fax either by sender
//! mapping (fast path) or by OCR + optional PHI redaction + LLM (full path),
//! and routes one notification email per fax with the original document
//! attached. Every external collaborator sits behind a trait in its own
//! module; the pipeline core lives in [`pipeline`].

pub mod api;
pub mod classify;
pub mod config;
pub mod fetch;
pub mod models;
pub mod notify;
pub mod ocr;
pub mod pipeline;
pub mod poller;
pub mod redact;
