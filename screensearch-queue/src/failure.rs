//! Failure classification for a worker's extraction attempt.
//!
//! Most failures (OCR engine hiccups, a momentarily unavailable catalog
//! connection, transient I/O) are recoverable and go back on the queue with
//! a bumped retry count. A narrow set of signals mean the frame's pixel
//! data is provably gone - those are unrecoverable, and only the
//! verifiable ones (`FrameOutOfRange`, a genuinely empty segment file) are
//! allowed to delete the frame row outright, and only after the
//! three-part verification gate in `verify_deletable` passes.

use screensearch_db::DatabaseManager;
use screensearch_ocr::OcrError;
use screensearch_store::{SegmentStore, StoreError};

#[derive(Debug)]
pub enum WorkerError {
    Store(StoreError),
    Ocr(OcrError),
    Db(screensearch_db::DatabaseError),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Store(e) => write!(f, "{}", e),
            WorkerError::Ocr(e) => write!(f, "{}", e),
            WorkerError::Db(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for WorkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkerError::Store(e) => Some(e),
            WorkerError::Ocr(e) => Some(e),
            WorkerError::Db(e) => Some(e),
        }
    }
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        WorkerError::Store(e)
    }
}

impl From<OcrError> for WorkerError {
    fn from(e: OcrError) -> Self {
        WorkerError::Ocr(e)
    }
}

impl From<screensearch_db::DatabaseError> for WorkerError {
    fn from(e: screensearch_db::DatabaseError) -> Self {
        WorkerError::Db(e)
    }
}

/// What a worker should do after a failed extraction attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FailureAction {
    /// Requeue with `retry_count + 1`, or mark `failed` if that would
    /// exceed `max_retries`.
    Recoverable,
    /// Mark `failed` without deleting - an unrecoverable signal that
    /// can't be (or wasn't) verified safe to delete for.
    MarkFailedNoDelete,
    /// A verifiably unrecoverable signal (`FrameOutOfRange` or an empty
    /// segment). The caller must still run `verify_deletable` before
    /// actually deleting the row.
    VerifiedUnrecoverable,
}

pub fn classify(err: &WorkerError) -> FailureAction {
    match err {
        WorkerError::Store(StoreError::FrameOutOfRange { .. }) => {
            FailureAction::VerifiedUnrecoverable
        }
        WorkerError::Store(StoreError::FileMissing(_)) => FailureAction::MarkFailedNoDelete,
        WorkerError::Store(StoreError::Damaged(_)) => FailureAction::MarkFailedNoDelete,
        // Everything else - OCR engine hiccups, timeouts, a momentarily
        // unavailable catalog connection, transient I/O during encode or
        // decode - is recoverable.
        _ => FailureAction::Recoverable,
    }
}

/// The three checks required before a `VerifiedUnrecoverable` outcome
/// actually deletes a frame row: the error text unambiguously says "out
/// of range", the frame and its segment both still exist in the catalog,
/// and the segment's file exists on disk. Any failing check downgrades
/// the outcome to "mark failed" so a transient read race during a
/// still-fragmenting segment's tail can never destroy data.
pub async fn verify_deletable(
    db: &DatabaseManager,
    store: &SegmentStore,
    frame_id: i64,
    error_text: &str,
) -> bool {
    if !error_text.to_lowercase().contains("out of range") {
        return false;
    }

    let Ok(Some(frame)) = db.frame_by_id(frame_id).await else {
        return false;
    };
    let Ok(Some(segment)) = db.segment_by_id(frame.segment_id).await else {
        return false;
    };

    store.segment_exists(segment.id, segment.opened_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_out_of_range_is_verified_unrecoverable() {
        let err = WorkerError::Store(StoreError::FrameOutOfRange {
            segment_id: 1,
            index: 5,
            frame_count: 3,
        });
        assert_eq!(classify(&err), FailureAction::VerifiedUnrecoverable);
    }

    #[test]
    fn file_missing_is_marked_failed_without_delete() {
        let err = WorkerError::Store(StoreError::FileMissing("x.mp4".into()));
        assert_eq!(classify(&err), FailureAction::MarkFailedNoDelete);
    }

    #[test]
    fn damaged_media_is_marked_failed_without_delete() {
        let err = WorkerError::Store(StoreError::Damaged("x.mp4".into()));
        assert_eq!(classify(&err), FailureAction::MarkFailedNoDelete);
    }

    #[test]
    fn engine_error_is_recoverable() {
        let err = WorkerError::Ocr(OcrError::EngineError("timed out".into()));
        assert_eq!(classify(&err), FailureAction::Recoverable);
    }
}
