//! Fax intake-and-processing pipeline.
//!
//! Modules connected left to right:
//! ```text
//! queue → worker → processor → {fetch | redact | classify} → notify → staging
//! ```
//!
//! The processor guarantees that every dequeued record terminates in exactly
//! one notification with a definite category; the worker guarantees records
//! are handled sequentially in arrival order; staging guarantees the
//! attached document outlives any failed notification.

pub mod processor;
pub mod queue;
pub mod sender_map;
pub mod staging;
pub mod worker;

pub use processor::{FaxPipeline, UNRESOLVED_CATEGORY};
pub use queue::{fax_queue, FaxQueue, FaxQueueReceiver};
pub use sender_map::SenderMap;
pub use staging::{spawn_retention_sweeper, StagingArea};
pub use worker::{spawn_worker, PipelineHandle};
