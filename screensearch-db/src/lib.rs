//! Catalog: the SQLite-backed index of segments, frames, the OCR queue,
//! and extracted text.
//!
//! This crate provides SQLite database access for the capture-to-index
//! pipeline. It uses sqlx for type-safe database operations with
//! compile-time query verification where practical.
//!
//! # Architecture
//!
//! - `DatabaseManager`: connection pool + migrations, the lowest layer
//! - `catalog`: every atomic, multi-table operation the rest of the
//!   workspace calls, implemented as `impl DatabaseManager` methods so
//!   callers never see a raw `sqlx::Transaction`
//! - Connection pooling with configurable limits
//! - WAL mode for concurrent read/write access
//! - FTS5 for full-text search over extracted text
//! - Automatic schema migrations
//!
//! # Example
//!
//! ```no_run
//! use screensearch_db::{DatabaseManager, NewSegment};
//! use chrono::Utc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = DatabaseManager::new("screensearch.db").await?;
//!
//!     let segment_id = db
//!         .insert_segment(NewSegment {
//!             opened_at: Utc::now(),
//!             relative_path: "2026/07/28/segment_1.mp4".into(),
//!             width: 1920,
//!             height: 1080,
//!             display_id: 0,
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod catalog;
pub mod db;
pub mod migrations;
pub mod models;

pub use catalog::DatabaseStatistics;
pub use db::DatabaseManager;
pub use models::{
    ExtractedTextRecord, FrameFilter, FrameRecord, FrameTagRecord, NewFrame, NewRegion,
    NewSegment, NewTag, Pagination, ProcessingStatus, QueueRowRecord, RegionRecord,
    SegmentRecord, SettingsRecord, TagRecord, UpdateSettings,
};

/// Database-related errors.
///
/// `InvariantViolation` and `Unavailable` are the two variants the rest of
/// the workspace branches on: `Unavailable` (pool exhaustion, a locked
/// file, I/O) is treated as transient and retried by callers;
/// `InvariantViolation` means the schema's own constraints were violated
/// by a caller bug and is never retried.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("database initialization failed: {0}")]
    InitializationError(String),

    #[error("migration failed: {0}")]
    MigrationError(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DatabaseError {
    /// True when a caller should back off and retry rather than treat this
    /// as a terminal failure of the operation it wraps.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::Unavailable(_)
                | DatabaseError::SqlxError(sqlx::Error::PoolTimedOut)
                | DatabaseError::SqlxError(sqlx::Error::Io(_))
                | DatabaseError::IoError(_)
        )
    }
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Minimum number of connections in pool
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,

    /// Enable WAL mode
    pub enable_wal: bool,

    /// Cache size in KB (negative = KB of memory)
    pub cache_size_kb: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "screensearch.db".to_string(),
            max_connections: 16,
            min_connections: 2,
            acquire_timeout_secs: 10,
            enable_wal: true,
            cache_size_kb: -2000, // 2MB
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with custom path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, "screensearch.db");
        assert!(config.enable_wal);
    }

    #[test]
    fn test_custom_config() {
        let config = DatabaseConfig::new("custom.db");
        assert_eq!(config.path, "custom.db");
    }

    #[test]
    fn unavailable_errors_are_transient() {
        let err = DatabaseError::Unavailable("pool exhausted".into());
        assert!(err.is_transient());
        let err = DatabaseError::InvariantViolation("duplicate open segment".into());
        assert!(!err.is_transient());
    }
}
