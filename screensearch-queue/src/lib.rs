//! Durable OCR work queue: priority ordering, worker pool, retry policy,
//! crash recovery, and failure classification.
//!
//! The queue's state of record is `screensearch_db::Catalog`'s
//! `processing_queue` table, not an in-process channel - a worker pool
//! that dies mid-extraction leaves its frame in `processing`, and
//! `OcrQueue::requeue_crashed` recovers it on the next startup.

pub mod config;
pub mod failure;
pub mod pixel_cache;
pub mod queue;

pub use config::OcrQueueConfig;
pub use failure::{FailureAction, WorkerError};
pub use pixel_cache::PixelCache;
pub use queue::{OcrQueue, WorkerPoolHandle};

pub type Result<T> = std::result::Result<T, WorkerError>;
