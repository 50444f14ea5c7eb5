//! Durable OCR work queue and worker pool.
//!
//! Drives a worker-loop shape (spawn N workers, track metrics, retry with
//! backoff) off `screensearch-db::Catalog`'s `processing_queue` table
//! instead of an in-memory `mpsc` channel, so queued work survives a
//! process crash instead of dying with it.

use crate::config::OcrQueueConfig;
use crate::failure::{classify, verify_deletable, FailureAction, WorkerError};
use crate::pixel_cache::PixelCache;
use chrono::Utc;
use screensearch_db::{DatabaseManager, FrameRecord, ProcessingStatus};
use screensearch_ocr::TextExtractor;
use screensearch_store::SegmentStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, WorkerError>;

/// The durable queue plus the worker pool that drains it. One instance per
/// process; `enqueue`/`depth` are cheap catalog calls any actor can make,
/// `spawn` starts the workers that actually run OCR.
pub struct OcrQueue {
    db: Arc<DatabaseManager>,
    store: Arc<SegmentStore>,
    extractor: Arc<TextExtractor>,
    pixel_cache: PixelCache,
    config: OcrQueueConfig,
    ready: Arc<AtomicBool>,
}

impl OcrQueue {
    pub fn new(
        db: Arc<DatabaseManager>,
        store: Arc<SegmentStore>,
        extractor: Arc<TextExtractor>,
        config: OcrQueueConfig,
    ) -> Self {
        Self {
            db,
            store,
            extractor,
            pixel_cache: PixelCache::new(),
            config,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The in-memory pixel cache `FrameIngestor` populates on enqueue so a
    /// worker can skip a `SegmentStore::read_frame` round trip for a
    /// frame it hasn't flushed yet.
    pub fn pixel_cache(&self) -> &PixelCache {
        &self.pixel_cache
    }

    pub fn config(&self) -> &OcrQueueConfig {
        &self.config
    }

    /// Workers wait on this before their first dequeue attempt - set once
    /// catalog startup (migrations, orphan sweep, crash recovery) has
    /// finished.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub async fn depth(&self) -> Result<i64> {
        Ok(self.db.queue_depth().await?)
    }

    /// Enqueues `frame_id` unless the queue is already at
    /// `queue_max_depth`, in which case it returns `Ok(false)` so the
    /// caller drops the frame rather than blocking - the same backpressure
    /// contract `ScreenSource` uses for capture ticks.
    pub async fn enqueue(&self, frame_id: i64, priority: i64) -> Result<bool> {
        if self.db.queue_depth().await? >= self.config.queue_max_depth {
            tracing::warn!(frame_id, "queue at max depth, dropping enqueue");
            return Ok(false);
        }
        self.db.enqueue_frame(frame_id, Utc::now(), priority).await?;
        Ok(true)
    }

    /// Crash recovery: every frame left in `processing` from a prior run
    /// either gets its segment file verified and is reset to `pending` +
    /// re-enqueued, or is terminal-failed if the segment is gone. Safe to
    /// run on a clean shutdown too - an empty crashed set is a no-op.
    pub async fn requeue_crashed(&self) -> Result<usize> {
        let crashed = self.db.list_crashed_processing_frames().await?;
        let mut recovered = 0;
        for frame in crashed {
            if self.segment_file_exists(&frame).await {
                self.db
                    .requeue_frame(frame.id, Utc::now(), 0, 0, None)
                    .await?;
                recovered += 1;
            } else {
                tracing::warn!(
                    frame_id = frame.id,
                    "crash recovery: segment missing, terminal-failing frame"
                );
                self.db
                    .update_frame_status(frame.id, ProcessingStatus::Failed)
                    .await?;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "crash recovery re-enqueued frames");
        }
        Ok(recovered)
    }

    async fn segment_file_exists(&self, frame: &FrameRecord) -> bool {
        match self.db.segment_by_id(frame.segment_id).await {
            Ok(Some(segment)) => self.store.segment_exists(segment.id, segment.opened_at),
            _ => false,
        }
    }

    /// Spawns `worker_count` worker tasks and returns a handle that stops
    /// them on `shutdown()`.
    pub fn spawn(self: Arc<Self>) -> WorkerPoolHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let queue = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                queue.run_worker(worker_id, shutdown).await;
            }));
        }
        WorkerPoolHandle {
            shutdown,
            handles,
            grace: self.config.shutdown_grace,
        }
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize, shutdown: Arc<AtomicBool>) {
        tracing::info!(worker_id, "OCR worker started");
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if !self.is_ready() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            match self.db.dequeue_frame().await {
                Ok(Some((row, frame))) => {
                    let retry_count = row.retry_count;
                    let priority = row.priority;
                    if let Err(err) = self.process_one(&frame).await {
                        self.handle_failure(&frame, priority, retry_count, err).await;
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "dequeue failed, backing off");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
        tracing::info!(worker_id, "OCR worker stopped");
    }

    /// Resolves pixels, extracts, and writes through. The frame is
    /// already `processing` by the time this is called -
    /// `dequeue_frame` set that as part of the same catalog operation that
    /// removed the queue row.
    async fn process_one(&self, frame: &FrameRecord) -> Result<()> {
        let pixels = self.resolve_pixels(frame).await?;
        self.extractor
            .extract_and_store(&self.db, frame.id, frame.segment_id, &pixels)
            .await
            .map_err(WorkerError::from)?;
        Ok(())
    }

    async fn resolve_pixels(
        &self,
        frame: &FrameRecord,
    ) -> Result<screensearch_core::PixelBuffer> {
        if let Some(pixels) = self.pixel_cache.take(frame.id) {
            return Ok(pixels);
        }
        let segment = self
            .db
            .segment_by_id(frame.segment_id)
            .await?
            .ok_or_else(|| {
                WorkerError::Store(screensearch_store::StoreError::FileMissing(
                    format!("segment {} missing from catalog", frame.segment_id).into(),
                ))
            })?;
        let pixels = self.store.read_frame(
            segment.id,
            segment.opened_at,
            frame.frame_index_in_segment as u32,
            segment.frame_count as u32,
        )?;
        Ok(pixels)
    }

    async fn handle_failure(
        &self,
        frame: &FrameRecord,
        priority: i64,
        retry_count: i64,
        err: WorkerError,
    ) {
        let error_text = err.to_string();
        match classify(&err) {
            FailureAction::Recoverable => {
                let next_retry = retry_count + 1;
                if next_retry > self.config.max_retries {
                    tracing::warn!(
                        frame_id = frame.id,
                        retry_count,
                        error = %error_text,
                        "OCR retries exhausted, marking failed"
                    );
                    let _ = self
                        .db
                        .update_frame_status(frame.id, ProcessingStatus::Failed)
                        .await;
                } else {
                    tracing::debug!(
                        frame_id = frame.id,
                        next_retry,
                        error = %error_text,
                        "requeueing frame after recoverable failure"
                    );
                    let _ = self
                        .db
                        .requeue_frame(frame.id, Utc::now(), priority, next_retry, Some(&error_text))
                        .await;
                }
            }
            FailureAction::MarkFailedNoDelete => {
                tracing::warn!(frame_id = frame.id, error = %error_text, "unrecoverable OCR failure, marking failed");
                let _ = self
                    .db
                    .update_frame_status(frame.id, ProcessingStatus::Failed)
                    .await;
            }
            FailureAction::VerifiedUnrecoverable => {
                if verify_deletable(&self.db, &self.store, frame.id, &error_text).await {
                    tracing::warn!(frame_id = frame.id, "verified unrecoverable frame, deleting");
                    let _ = self.db.delete_frame(frame.id).await;
                } else {
                    tracing::warn!(
                        frame_id = frame.id,
                        error = %error_text,
                        "unrecoverable signal failed verification, marking failed instead of deleting"
                    );
                    let _ = self
                        .db
                        .update_frame_status(frame.id, ProcessingStatus::Failed)
                        .await;
                }
            }
        }
    }
}

/// Handle returned by `OcrQueue::spawn`. Dropping it leaves the workers
/// running; call `shutdown` to stop them.
pub struct WorkerPoolHandle {
    shutdown: Arc<AtomicBool>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    grace: Duration,
}

impl WorkerPoolHandle {
    /// Signals workers to stop after their current iteration and waits up
    /// to the configured grace period for them to drain. In-flight
    /// extraction always runs to completion - this only bounds how long
    /// we wait for the *next* loop check to observe the flag.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let join_all = futures::future::join_all(self.handles);
        if tokio::time::timeout(self.grace, join_all).await.is_err() {
            tracing::warn!("worker pool shutdown grace period elapsed with workers still running");
        }
    }
}
