//! Tuning for segment rollover, deduplication, and retention.

use std::time::Duration;

/// Controls `FrameIngestor`'s per-tick decisions: whether to dedup, and
/// when a segment rolls over - wall-clock span, resolution/display
/// change, or a max-frame-count cap so a stalled clock doesn't grow one
/// segment unboundedly (DESIGN.md open question decision #4).
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub deduplicate: bool,
    pub dedup_threshold: f32,

    /// A segment is closed once its wall-clock span since `opened_at`
    /// exceeds this, even if resolution and display haven't changed.
    pub segment_max_duration: Duration,

    /// A segment is also closed once it holds this many frames,
    /// regardless of elapsed time.
    pub segment_max_frames: u32,

    /// How often an open segment's encoder is flushed so its tail is
    /// readable before `finalize` (the segment file is written as
    /// fragmented MP4 specifically so this works).
    pub flush_every_frames: u32,

    /// Priority recorded on every enqueued frame. `OcrQueue` dequeues by
    /// descending priority, so this only matters once multiple priority
    /// classes exist; ingestion only ever produces one.
    pub ocr_priority: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            deduplicate: true,
            dedup_threshold: 0.95,
            segment_max_duration: Duration::from_secs(5 * 60),
            segment_max_frames: 1800,
            flush_every_frames: 30,
            ocr_priority: 0,
        }
    }
}

/// `RetentionEnforcer`'s age-then-size eviction policy.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// `0` disables the age policy.
    pub retention_age_days: i64,

    /// `0.0` disables the size policy.
    pub max_storage_gb: f64,

    /// How often the enforcer's background loop re-applies both policies.
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_age_days: 30,
            max_storage_gb: 20.0,
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}
