//! Region-based OCR, accessibility merge, and URL extraction.
//!
//! `TextExtractor` runs tile-cached, chrome/content-separated OCR and
//! merges in accessibility text, behind an engine-agnostic
//! `TextRecognizer` trait.

use thiserror::Error;

pub mod accessibility;
pub mod extractor;
pub mod recognizer;
pub mod tile_cache;
pub mod url_extract;

pub use accessibility::{AccessibilityProvider, UiAutomationProvider};
pub use extractor::{ExtractedText, ExtractorConfig, TextExtractor};
pub use recognizer::{RawTextRegion, TextRecognizer, WindowsOcrRecognizer};
pub use tile_cache::FullFrameCache;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine error: {0}")]
    EngineError(String),

    #[error("image encode error: {0}")]
    EncodeError(String),

    #[error("accessibility error: {0}")]
    AccessibilityError(String),

    #[error("accessibility permission denied")]
    PermissionDenied,

    #[error("recognition timed out")]
    TimedOut,

    #[error("catalog error: {0}")]
    Catalog(#[from] screensearch_db::DatabaseError),
}

impl OcrError {
    /// True for failures the OCR queue should requeue rather than treat as
    /// terminal - everything here is an engine/timeout/catalog hiccup, not
    /// a statement about the frame's pixel data itself.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OcrError::EngineError(_) | OcrError::TimedOut | OcrError::Catalog(_)
        ) || matches!(self, OcrError::Catalog(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, OcrError>;
