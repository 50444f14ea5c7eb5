//! Error type for the ingestion and retention pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("capture error: {0}")]
    Capture(#[from] screensearch_capture::CaptureError),

    #[error("store error: {0}")]
    Store(#[from] screensearch_store::StoreError),

    #[error("catalog error: {0}")]
    Db(#[from] screensearch_db::DatabaseError),

    #[error("queue error: {0}")]
    Queue(#[from] screensearch_queue::WorkerError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
