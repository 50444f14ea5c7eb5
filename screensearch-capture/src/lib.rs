//! Screen capture and window/display tracking.
//!
//! Provides `ScreenSource`, the per-tick capture abstraction consumed by
//! `screensearch-ingest`, plus the supporting deduplication and active-display
//! tracking machinery. Windows-backed today; the trait boundary is what
//! keeps a future platform backend from touching the ingest pipeline.

use thiserror::Error;

pub mod dedup;
pub mod display_tracker;
pub mod private_windows;
pub mod source;
pub mod window_enum;

pub use dedup::Deduplicator;
pub use display_tracker::{ActiveDisplayTracker, DisplayTrackerError, DisplayTrackerEvents};
pub use source::{CaptureTickConfig, ScreenSource, WindowsScreenSource};
pub use window_enum::enumerate_windows;

/// Errors that can occur during screen capture operations.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to initialize capture: {0}")]
    InitializationError(String),

    #[error("failed to capture screen: {0}")]
    ScreenCaptureError(String),

    #[error("invalid display: {0}")]
    InvalidDisplay(i64),

    #[error("windows api error: {0}")]
    WindowsApiError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
