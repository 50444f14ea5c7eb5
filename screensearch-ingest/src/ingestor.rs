//! `FrameIngestor`: the single consumer of a `ScreenSource`'s tick stream.
//!
//! Grounded on the teacher's `src/main.rs::App::run_with_signal` wiring
//! (`CaptureEngine` -> `mpsc` -> `OcrProcessor` -> `store_processed_frame`
//! -> `db.insert_frame`), restructured into the explicit 5-step algorithm
//! spec.md §4.7 spells out, with its ordering guarantee made structural
//! instead of implicit in one long async function: a segment append must
//! survive before the catalog insert for that frame is attempted.

use crate::config::IngestConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use screensearch_capture::{Deduplicator, ScreenSource};
use screensearch_core::clock::Clock;
use screensearch_core::types::CapturedFrame;
use screensearch_db::{DatabaseManager, NewFrame, NewSegment};
use screensearch_queue::OcrQueue;
use screensearch_store::{segment_relative_path, SegmentHandle, SegmentStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// `(width, height)` - at most one segment is open per resolution at a
/// time. Display isn't part of the key: only one display is ever captured
/// per tick (the main display, or the tracked active one), so there's
/// never more than one live stream at a given resolution to key on, and
/// `ActiveSegment::display_id` alone is enough to detect when that stream
/// switched displays.
type SegmentKey = (u32, u32);

struct ActiveSegment {
    handle: SegmentHandle,
    segment_id: i64,
    opened_at: DateTime<Utc>,
    display_id: i64,
    frames_since_flush: u32,
}

/// What happened to one tick's frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted { frame_id: i64, segment_id: i64 },
    /// Dropped by the deduplicator; no catalog row was written.
    Deduplicated,
    /// Captured and cataloged, but the OCR queue was at `queue_max_depth`
    /// so it was never enqueued - the frame row persists as `pending`
    /// forever unless something later enqueues it manually.
    QueueSaturated { frame_id: i64 },
}

pub struct FrameIngestor {
    db: Arc<DatabaseManager>,
    store: Arc<SegmentStore>,
    queue: Arc<OcrQueue>,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
    active: Mutex<HashMap<SegmentKey, ActiveSegment>>,
    dedup: Mutex<HashMap<SegmentKey, Deduplicator>>,
}

impl FrameIngestor {
    pub fn new(
        db: Arc<DatabaseManager>,
        store: Arc<SegmentStore>,
        queue: Arc<OcrQueue>,
        clock: Arc<dyn Clock>,
        config: IngestConfig,
    ) -> Self {
        Self {
            db,
            store,
            queue,
            clock,
            config,
            active: Mutex::new(HashMap::new()),
            dedup: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `source` to exhaustion: pulls ticks, ingests every frame in
    /// each, and stops once `shutdown` is set and a tick comes back empty.
    /// Finalizes every still-open segment before returning, matching
    /// spec.md §6's shutdown sequence.
    pub async fn run(&self, mut source: Box<dyn ScreenSource>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                source.stop();
            }
            match source.next_tick().await {
                Ok(frames) => {
                    if frames.is_empty() && shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    for frame in frames {
                        if let Err(e) = self.ingest(frame).await {
                            tracing::warn!(error = %e, "frame ingest failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "capture tick failed");
                }
            }
        }
        if let Err(e) = self.finalize_all().await {
            tracing::warn!(error = %e, "failed finalizing active segments on shutdown");
        }
    }

    /// The per-frame algorithm of spec.md §4.7, steps 1-5.
    pub async fn ingest(&self, frame: CapturedFrame) -> Result<IngestOutcome> {
        let (width, height) = frame.pixels.dimensions();
        let key: SegmentKey = (width, height);

        if self.config.deduplicate {
            let mut dedup = self.dedup.lock().await;
            let deduper = dedup
                .entry(key)
                .or_insert_with(|| Deduplicator::new(self.config.dedup_threshold));
            if !deduper.has_changed(&frame.pixels) {
                return Ok(IngestOutcome::Deduplicated);
            }
        }

        let (segment_id, frame_index) = self.append_to_segment(key, &frame).await?;

        let new_frame = NewFrame {
            segment_id,
            frame_index_in_segment: frame_index as i64,
            captured_at: frame.captured_at,
            display_id: frame.display_id.0,
            app_bundle_id: frame.metadata.app_bundle_id.clone(),
            app_name: frame.metadata.app_name.clone(),
            window_title: frame.metadata.window_title.clone(),
            browser_url: frame.metadata.browser_url.clone(),
        };

        // The pixel buffer already survived `SegmentHandle::append` at
        // this point. If this insert fails, nothing persisted on the
        // catalog side - there's no row to roll back - but the appended
        // frame in the video is now an orphan; the retention orphan sweep
        // reconciles it later since a video container can't be truncated
        // after an append without re-encoding.
        let frame_id = self.db.insert_frame(new_frame).await?;

        self.queue.pixel_cache().insert(frame_id, frame.pixels);
        if self.queue.enqueue(frame_id, self.config.ocr_priority).await? {
            Ok(IngestOutcome::Accepted {
                frame_id,
                segment_id,
            })
        } else {
            tracing::warn!(frame_id, "OCR queue at max depth, frame cataloged but not enqueued");
            Ok(IngestOutcome::QueueSaturated { frame_id })
        }
    }

    /// Appends `frame`'s pixels to the active segment for `key`, rolling
    /// over first if none is open, the open one has aged out (duration or
    /// frame-count cap), or the active display has changed since it opened
    /// (spec.md §4.3's rollover policy - a resolution change is implicit in
    /// `key` itself, since a mismatched key never finds an existing entry).
    async fn append_to_segment(&self, key: SegmentKey, frame: &CapturedFrame) -> Result<(i64, u32)> {
        let mut active = self.active.lock().await;
        let now = self.clock.now_utc();

        let needs_rollover = match active.get(&key) {
            None => true,
            Some(seg) => {
                let elapsed = (now - seg.opened_at).to_std().unwrap_or_default();
                elapsed >= self.config.segment_max_duration
                    || seg.handle.frame_count() >= self.config.segment_max_frames
                    || seg.display_id != frame.display_id.0
            }
        };

        if needs_rollover {
            if let Some(mut seg) = active.remove(&key) {
                seg.handle.finalize()?;
                self.db.close_segment(seg.segment_id, now).await?;
            }
            let (width, height) = frame.pixels.dimensions();
            let (segment_id, handle) =
                self.open_new_segment(frame.display_id.0, width, height, now).await?;
            active.insert(
                key,
                ActiveSegment {
                    handle,
                    segment_id,
                    opened_at: now,
                    display_id: frame.display_id.0,
                    frames_since_flush: 0,
                },
            );
        }

        let seg = active
            .get_mut(&key)
            .expect("segment was just opened or already present");
        let index = seg.handle.append(&frame.pixels)?;
        seg.frames_since_flush += 1;
        if seg.frames_since_flush >= self.config.flush_every_frames {
            seg.handle.flush()?;
            seg.frames_since_flush = 0;
        }
        Ok((seg.segment_id, index))
    }

    /// `insert_segment` needs a `relative_path` before the segment has an
    /// id, but the real path is derived from the id
    /// (`segment_relative_path`). So this inserts a placeholder that's
    /// unique by construction, then reconciles it once the id comes back.
    async fn open_new_segment(
        &self,
        display_id: i64,
        width: u32,
        height: u32,
        opened_at: DateTime<Utc>,
    ) -> Result<(i64, SegmentHandle)> {
        let placeholder = format!(
            "pending/{}-{}-{}x{}",
            opened_at.timestamp_nanos_opt().unwrap_or_default(),
            display_id,
            width,
            height,
        );
        let segment_id = self
            .db
            .insert_segment(NewSegment {
                opened_at,
                relative_path: placeholder,
                width: width as i64,
                height: height as i64,
                display_id,
            })
            .await?;

        let real_path = segment_relative_path(opened_at, segment_id);
        self.db
            .update_segment_path(segment_id, &real_path.to_string_lossy())
            .await?;

        let handle = self.store.open_segment(segment_id, opened_at, width, height)?;
        Ok((segment_id, handle))
    }

    /// Finalizes and closes every currently-open segment. Called on
    /// shutdown and available for tests that want a deterministic flush
    /// point without waiting on the duration/frame-count rollover.
    pub async fn finalize_all(&self) -> Result<()> {
        let mut active = self.active.lock().await;
        let now = self.clock.now_utc();
        for (_, mut seg) in active.drain() {
            seg.handle.finalize()?;
            self.db.close_segment(seg.segment_id, now).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use screensearch_core::clock::FakeClock;
    use screensearch_core::types::{DisplayId, FrameMetadata, PixelFormat};
    use screensearch_ocr::{
        AccessibilityProvider, ExtractorConfig, RawTextRegion, TextExtractor, TextRecognizer,
    };
    use screensearch_queue::OcrQueueConfig;
    use std::time::Duration;
    use tempfile::{NamedTempFile, TempDir};

    struct EmptyRecognizer;

    #[async_trait]
    impl TextRecognizer for EmptyRecognizer {
        async fn recognize(
            &self,
            _tile: &screensearch_core::types::PixelBuffer,
        ) -> screensearch_ocr::Result<Vec<RawTextRegion>> {
            Ok(Vec::new())
        }
    }

    struct EmptyAccessibility;

    #[async_trait]
    impl AccessibilityProvider for EmptyAccessibility {
        async fn focused_window_text(&self) -> screensearch_ocr::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    async fn test_ingestor() -> (FrameIngestor, Arc<DatabaseManager>, TempDir, NamedTempFile) {
        let db_file = NamedTempFile::new().unwrap();
        let db = Arc::new(
            DatabaseManager::new(&db_file.path().to_string_lossy().to_string())
                .await
                .unwrap(),
        );
        let store_dir = TempDir::new().unwrap();
        let store = Arc::new(SegmentStore::new(store_dir.path()).unwrap());

        let extractor = Arc::new(TextExtractor::new(
            ExtractorConfig::default(),
            Arc::new(EmptyRecognizer),
            Arc::new(EmptyAccessibility),
        ));
        let queue = Arc::new(OcrQueue::new(
            db.clone(),
            store.clone(),
            extractor,
            OcrQueueConfig::default(),
        ));
        let clock = FakeClock::new(Utc::now());
        let config = IngestConfig {
            segment_max_duration: Duration::from_secs(300),
            segment_max_frames: 3,
            flush_every_frames: 1,
            ..Default::default()
        };
        let ingestor = FrameIngestor::new(db.clone(), store, queue, clock, config);
        (ingestor, db, store_dir, db_file)
    }

    fn sample_frame(display: i64, w: u32, h: u32, color: u8) -> CapturedFrame {
        CapturedFrame {
            captured_at: Utc::now(),
            display_id: DisplayId(display),
            pixels: screensearch_core::types::PixelBuffer::new(
                w,
                h,
                PixelFormat::Bgra8,
                vec![color; (w * h * 4) as usize],
            ),
            metadata: FrameMetadata::default(),
        }
    }

    #[tokio::test]
    async fn first_frame_opens_a_segment_and_is_accepted() {
        let (ingestor, db, _store_dir, _db_file) = test_ingestor().await;
        let outcome = ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap();
        match outcome {
            IngestOutcome::Accepted { frame_id, segment_id } => {
                assert!(frame_id > 0);
                let segment = db.segment_by_id(segment_id).await.unwrap().unwrap();
                assert_eq!(segment.frame_count, 1);
                assert!(segment.closed_at.is_none());
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identical_second_frame_is_deduplicated() {
        let (ingestor, _db, _store_dir, _db_file) = test_ingestor().await;
        ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap();
        let outcome = ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Deduplicated);
    }

    #[tokio::test]
    async fn different_resolution_opens_a_second_segment() {
        let (ingestor, db, _store_dir, _db_file) = test_ingestor().await;
        let first = ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap();
        let second = ingestor.ingest(sample_frame(0, 8, 8, 20)).await.unwrap();
        let (IngestOutcome::Accepted { segment_id: s1, .. }, IngestOutcome::Accepted { segment_id: s2, .. }) =
            (first, second)
        else {
            panic!("expected both frames accepted");
        };
        assert_ne!(s1, s2);
        // The first segment is still open; a resolution change only opens
        // a new one for the new key, it doesn't close the old one.
        let seg1 = db.segment_by_id(s1).await.unwrap().unwrap();
        assert!(seg1.closed_at.is_none());
    }

    #[tokio::test]
    async fn active_display_change_rolls_the_segment_over_at_the_same_resolution() {
        let (ingestor, db, _store_dir, _db_file) = test_ingestor().await;
        let IngestOutcome::Accepted { segment_id: first_segment, .. } =
            ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap()
        else {
            panic!("expected acceptance");
        };
        // Same resolution, different display: the segment must close even
        // though neither the duration nor frame-count cap was hit.
        let IngestOutcome::Accepted { segment_id: second_segment, .. } =
            ingestor.ingest(sample_frame(1, 4, 4, 20)).await.unwrap()
        else {
            panic!("expected acceptance");
        };

        assert_ne!(first_segment, second_segment);
        let seg1 = db.segment_by_id(first_segment).await.unwrap().unwrap();
        assert!(seg1.closed_at.is_some());
        assert_eq!(seg1.frame_count, 1);
    }

    #[tokio::test]
    async fn max_frame_count_rolls_the_segment_over() {
        let (ingestor, db, _store_dir, _db_file) = test_ingestor().await;
        let mut segment_ids = Vec::new();
        for i in 0..4 {
            // alternate pixel content so dedup never drops a frame
            let outcome = ingestor.ingest(sample_frame(0, 4, 4, i as u8)).await.unwrap();
            if let IngestOutcome::Accepted { segment_id, .. } = outcome {
                segment_ids.push(segment_id);
            }
        }
        // segment_max_frames is 3: the 4th frame should land in a new segment.
        assert_ne!(segment_ids[0], segment_ids[3]);
        let first_segment = db.segment_by_id(segment_ids[0]).await.unwrap().unwrap();
        assert!(first_segment.closed_at.is_some());
        assert_eq!(first_segment.frame_count, 3);
    }

    #[tokio::test]
    async fn finalize_all_closes_every_open_segment() {
        let (ingestor, db, _store_dir, _db_file) = test_ingestor().await;
        let IngestOutcome::Accepted { segment_id, .. } =
            ingestor.ingest(sample_frame(0, 4, 4, 10)).await.unwrap()
        else {
            panic!("expected acceptance");
        };
        ingestor.finalize_all().await.unwrap();
        let segment = db.segment_by_id(segment_id).await.unwrap().unwrap();
        assert!(segment.closed_at.is_some());
    }
}
