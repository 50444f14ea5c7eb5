//! Database models and types
//!
//! Rust structs that map to catalog tables, plus the "new row" input types
//! each `insert_*` operation takes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A frame's place in the OCR pipeline. Stored as text in SQLite (no native
/// enum type) so the column stays human-readable in ad-hoc queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "processing" => Some(ProcessingStatus::Processing),
            "completed" => Some(ProcessingStatus::Completed),
            "failed" => Some(ProcessingStatus::Failed),
            "deleted" => Some(ProcessingStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Segment record - one compressed video file.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SegmentRecord {
    pub id: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub relative_path: String,
    pub width: i64,
    pub height: i64,
    pub display_id: i64,
    pub frame_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Frame record - metadata for one captured tick.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FrameRecord {
    pub id: i64,
    pub segment_id: i64,
    pub frame_index_in_segment: i64,
    pub captured_at: DateTime<Utc>,
    pub display_id: i64,
    pub app_bundle_id: Option<String>,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
    pub browser_url: Option<String>,
    pub processing_status: String,
    pub source_kind: String,
    pub created_at: DateTime<Utc>,
}

impl FrameRecord {
    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus::parse(&self.processing_status).unwrap_or(ProcessingStatus::Pending)
    }
}

/// One row of the durable priority queue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueRowRecord {
    pub id: i64,
    pub frame_id: i64,
    pub enqueued_at: DateTime<Utc>,
    pub priority: i64,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

/// Extracted text record - the OCR result for a completed frame.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExtractedTextRecord {
    pub frame_id: i64,
    pub segment_id: i64,
    pub full_text: String,
    pub chrome_text: String,
    pub extracted_at: DateTime<Utc>,
}

/// A single OCR paragraph's bounding box, with its offset into the
/// frame's `full_text`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegionRecord {
    pub id: i64,
    pub frame_id: i64,
    pub text_offset: i64,
    pub text_length: i64,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub chrome_bit: i64,
    pub window_index: Option<i64>,
}

/// Tag record - user-defined category/annotation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TagRecord {
    pub id: i64,
    pub tag_name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Frame tag record - junction table entry.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FrameTagRecord {
    pub id: i64,
    pub frame_id: i64,
    pub tag_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Settings record - persisted CaptureConfig/RetentionConfig/OcrConfig
/// (singleton row, id = 1).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingsRecord {
    pub id: i64,
    pub capture_interval_ms: i64,
    pub dedup_threshold: f64,
    pub excluded_app_bundle_ids: String, // JSON array
    pub exclude_private_windows: i64,
    pub capture_active_display_only: i64,
    pub show_cursor: i64,
    pub max_resolution_width: i64,
    pub max_resolution_height: i64,
    pub accuracy: String,
    pub recognition_languages: String, // JSON array
    pub min_confidence: f64,
    pub accessibility_enabled: i64,
    pub region_based_enabled: i64,
    pub max_retries: i64,
    pub worker_count: i64,
    pub queue_max_depth: i64,
    pub retention_age_days: i64,
    pub max_storage_gb: f64,
    pub is_paused: i64,
    pub updated_at: DateTime<Utc>,
}

// ===== Input types for creating new records =====

#[derive(Debug, Clone)]
pub struct NewSegment {
    pub opened_at: DateTime<Utc>,
    pub relative_path: String,
    pub width: i64,
    pub height: i64,
    pub display_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewFrame {
    pub segment_id: i64,
    pub frame_index_in_segment: i64,
    pub captured_at: DateTime<Utc>,
    pub display_id: i64,
    pub app_bundle_id: Option<String>,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
    pub browser_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRegion {
    pub text_offset: i64,
    pub text_length: i64,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub chrome_bit: bool,
    pub window_index: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewTag {
    pub tag_name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    pub capture_interval_ms: i64,
    pub dedup_threshold: f64,
    pub excluded_app_bundle_ids: String,
    pub exclude_private_windows: bool,
    pub capture_active_display_only: bool,
    pub max_retries: i64,
    pub worker_count: i64,
    pub queue_max_depth: i64,
    pub retention_age_days: i64,
    pub max_storage_gb: f64,
}

/// Frame filter parameters for range queries.
#[derive(Debug, Clone, Default)]
pub struct FrameFilter {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub app_bundle_id: Option<String>,
    pub display_id: Option<i64>,
}

/// Pagination parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}
