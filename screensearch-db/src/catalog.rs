//! Catalog operations.
//!
//! Every multi-step or multi-table operation the rest of the workspace
//! needs runs here, inside a single `sqlx::Transaction`, so it is atomic
//! with respect to every other caller. Simple single-row lookups skip the
//! transaction wrapper.

use crate::models::*;
use crate::{DatabaseError, DatabaseManager, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

impl DatabaseManager {
    // ===== Segment operations =====

    /// Opens a new segment row. Fails with `InvariantViolation` if another
    /// segment is already open at the same `(width, height)` - enforced by
    /// a partial unique index, so this is safe under concurrent callers
    /// without an application-level lock. Callers (`FrameIngestor`) close
    /// any existing open segment for the resolution first, including on a
    /// display change, so this should never actually fire outside a bug.
    pub async fn insert_segment(&self, segment: NewSegment) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO segments (opened_at, relative_path, width, height, display_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(segment.opened_at)
        .bind(&segment.relative_path)
        .bind(segment.width)
        .bind(segment.height)
        .bind(segment.display_id)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::InvariantViolation(format!(
                    "a segment is already open at {}x{}",
                    segment.width, segment.height
                ))
            }
            _ => DatabaseError::SqlxError(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Reconciles a segment's `relative_path` once its id (and therefore
    /// its real on-disk path) is known. `insert_segment` has to be called
    /// before the id exists, so callers that derive the path from the id
    /// (`screensearch_store::segment_relative_path`) insert a placeholder
    /// first and call this right after.
    pub async fn update_segment_path(&self, segment_id: i64, relative_path: &str) -> Result<()> {
        sqlx::query("UPDATE segments SET relative_path = ? WHERE id = ?")
            .bind(relative_path)
            .bind(segment_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Marks a segment closed. Idempotent: closing an already-closed
    /// segment is a no-op rather than an error, so a crash between closing
    /// the catalog row and finalizing the file doesn't wedge recovery.
    pub async fn close_segment(&self, segment_id: i64, closed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE segments SET closed_at = ? WHERE id = ? AND closed_at IS NULL")
            .bind(closed_at)
            .bind(segment_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn segment_by_id(&self, id: i64) -> Result<Option<SegmentRecord>> {
        let segment = sqlx::query_as::<_, SegmentRecord>(
            r#"
            SELECT id, opened_at, closed_at, relative_path, width, height,
                   display_id, frame_count, created_at
            FROM segments WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(segment)
    }

    /// The open segment (if any) for a given resolution, used by
    /// `FrameIngestor` to decide whether to append to an existing segment
    /// or roll over to a new one.
    pub async fn open_segment_for(&self, width: i64, height: i64) -> Result<Option<SegmentRecord>> {
        let segment = sqlx::query_as::<_, SegmentRecord>(
            r#"
            SELECT id, opened_at, closed_at, relative_path, width, height,
                   display_id, frame_count, created_at
            FROM segments
            WHERE width = ? AND height = ? AND closed_at IS NULL
            "#,
        )
        .bind(width)
        .bind(height)
        .fetch_optional(self.pool())
        .await?;
        Ok(segment)
    }

    /// Segments whose open interval `[opened_at, closed_at or now)`
    /// overlaps `[start, end]`. Used to resolve a time-range search query
    /// into the set of segment files that need reading.
    pub async fn segments_touching_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SegmentRecord>> {
        let segments = sqlx::query_as::<_, SegmentRecord>(
            r#"
            SELECT id, opened_at, closed_at, relative_path, width, height,
                   display_id, frame_count, created_at
            FROM segments
            WHERE opened_at <= ? AND (closed_at IS NULL OR closed_at >= ?)
            ORDER BY opened_at ASC
            "#,
        )
        .bind(end)
        .bind(start)
        .fetch_all(self.pool())
        .await?;
        Ok(segments)
    }

    /// Closed segments whose `closed_at` is strictly before `cutoff`,
    /// oldest first. Used by `RetentionEnforcer`'s age policy - an open
    /// segment is never a candidate, since age deletion keys off
    /// `closed_at` and an unclosed segment has none.
    pub async fn segments_closed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<SegmentRecord>> {
        let segments = sqlx::query_as::<_, SegmentRecord>(
            r#"
            SELECT id, opened_at, closed_at, relative_path, width, height,
                   display_id, frame_count, created_at
            FROM segments
            WHERE closed_at IS NOT NULL AND closed_at < ?
            ORDER BY closed_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;
        Ok(segments)
    }

    /// The single oldest closed segment by `closed_at`, if any. Drained
    /// one at a time by `RetentionEnforcer`'s size policy so the loop can
    /// re-check total size after every delete instead of committing to a
    /// batch that might overshoot.
    pub async fn oldest_closed_segment(&self) -> Result<Option<SegmentRecord>> {
        let segment = sqlx::query_as::<_, SegmentRecord>(
            r#"
            SELECT id, opened_at, closed_at, relative_path, width, height,
                   display_id, frame_count, created_at
            FROM segments
            WHERE closed_at IS NOT NULL
            ORDER BY closed_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(segment)
    }

    /// Frame ids captured at or after `cutoff`, for the operator "quick
    /// delete" variant - deletes recent frames rather than a whole
    /// segment, so it walks frame rows instead of `segments_closed_before`.
    pub async fn frame_ids_captured_from(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM frames WHERE captured_at >= ?")
            .bind(cutoff)
            .fetch_all(self.pool())
            .await?;
        Ok(ids)
    }

    /// Deletes a segment and (via `ON DELETE CASCADE`) every frame,
    /// region, extracted-text row, and queue row that referenced it. Does
    /// not touch the backing file - callers unlink it with
    /// `SegmentStore::delete_segment` after this returns, so a crash
    /// between the two leaves an orphan file, never an orphan row.
    pub async fn delete_segment_cascade(&self, segment_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM segments WHERE id = ?")
            .bind(segment_id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            tracing::debug!(segment_id, "delete_segment_cascade: segment already absent");
        }
        Ok(())
    }

    /// All segment ids and relative paths, used by the storage-root orphan
    /// sweep to find files with no matching catalog row.
    pub async fn all_segment_paths(&self) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query("SELECT id, relative_path FROM segments")
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<i64, _>(0), r.get::<String, _>(1)))
            .collect())
    }

    // ===== Frame operations =====

    /// Inserts a frame row. The segment's `frame_count` is bumped by a
    /// trigger, not here, so this stays a single statement.
    pub async fn insert_frame(&self, frame: NewFrame) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO frames (
                segment_id, frame_index_in_segment, captured_at, display_id,
                app_bundle_id, app_name, window_title, browser_url
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(frame.segment_id)
        .bind(frame.frame_index_in_segment)
        .bind(frame.captured_at)
        .bind(frame.display_id)
        .bind(&frame.app_bundle_id)
        .bind(&frame.app_name)
        .bind(&frame.window_title)
        .bind(&frame.browser_url)
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DatabaseError::InvariantViolation(format!(
                    "duplicate frame index {} in segment {}",
                    frame.frame_index_in_segment, frame.segment_id
                ))
            }
            _ => DatabaseError::SqlxError(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    pub async fn frame_by_id(&self, id: i64) -> Result<Option<FrameRecord>> {
        let frame = sqlx::query_as::<_, FrameRecord>(
            r#"
            SELECT id, segment_id, frame_index_in_segment, captured_at, display_id,
                   app_bundle_id, app_name, window_title, browser_url,
                   processing_status, source_kind, created_at
            FROM frames
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(frame)
    }

    pub async fn update_frame_status(&self, frame_id: i64, status: ProcessingStatus) -> Result<()> {
        sqlx::query("UPDATE frames SET processing_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(frame_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Deletes a frame and everything that cascades from it (regions,
    /// extracted text, queue row). Used for the `Unrecoverable` failure
    /// path in the OCR queue, after the caller has already verified the
    /// frame is truly gone (frame/segment rows exist, segment file
    /// missing or the index really is out of range).
    pub async fn delete_frame(&self, frame_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM frames WHERE id = ?")
            .bind(frame_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Frames stuck in `processing` - the crash-recovery set. A worker
    /// that was mid-extraction when the process died leaves its frame
    /// here; startup resets these to `pending` (or requeues with an
    /// incremented retry count) after verifying the segment still exists.
    pub async fn list_crashed_processing_frames(&self) -> Result<Vec<FrameRecord>> {
        let frames = sqlx::query_as::<_, FrameRecord>(
            r#"
            SELECT id, segment_id, frame_index_in_segment, captured_at, display_id,
                   app_bundle_id, app_name, window_title, browser_url,
                   processing_status, source_kind, created_at
            FROM frames
            WHERE processing_status = 'processing'
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(frames)
    }

    pub async fn frames_in_range(
        &self,
        filter: FrameFilter,
        pagination: Pagination,
    ) -> Result<Vec<FrameRecord>> {
        let mut sql = String::from(
            r#"
            SELECT id, segment_id, frame_index_in_segment, captured_at, display_id,
                   app_bundle_id, app_name, window_title, browser_url,
                   processing_status, source_kind, created_at
            FROM frames
            WHERE 1=1
            "#,
        );
        if filter.start_time.is_some() {
            sql.push_str(" AND captured_at >= ?");
        }
        if filter.end_time.is_some() {
            sql.push_str(" AND captured_at <= ?");
        }
        if filter.app_bundle_id.is_some() {
            sql.push_str(" AND app_bundle_id = ?");
        }
        if filter.display_id.is_some() {
            sql.push_str(" AND display_id = ?");
        }
        sql.push_str(" ORDER BY captured_at DESC LIMIT ? OFFSET ?");

        let mut q = sqlx::query_as::<_, FrameRecord>(&sql);
        if let Some(start) = filter.start_time {
            q = q.bind(start);
        }
        if let Some(end) = filter.end_time {
            q = q.bind(end);
        }
        if let Some(app) = &filter.app_bundle_id {
            q = q.bind(app);
        }
        if let Some(display) = filter.display_id {
            q = q.bind(display);
        }
        let frames = q
            .bind(pagination.limit)
            .bind(pagination.offset)
            .fetch_all(self.pool())
            .await?;
        Ok(frames)
    }

    // ===== Queue operations =====

    /// Idempotent: a frame already queued (row exists for `frame_id`,
    /// enforced by `UNIQUE(frame_id)`) is left alone rather than
    /// duplicated.
    pub async fn enqueue_frame(
        &self,
        frame_id: i64,
        enqueued_at: DateTime<Utc>,
        priority: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_queue (frame_id, enqueued_at, priority, retry_count)
            VALUES (?, ?, ?, 0)
            ON CONFLICT(frame_id) DO NOTHING
            "#,
        )
        .bind(frame_id)
        .bind(enqueued_at)
        .bind(priority)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Atomically pops the highest-priority, earliest-enqueued row and
    /// transitions its frame to `processing`. Implemented as a single
    /// `DELETE ... RETURNING` inside a transaction so there is no
    /// read-then-delete window for a second worker to race.
    pub async fn dequeue_frame(&self) -> Result<Option<(QueueRowRecord, FrameRecord)>> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::Unavailable(e.to_string()))?;

        let row = sqlx::query_as::<_, QueueRowRecord>(
            r#"
            DELETE FROM processing_queue
            WHERE id = (
                SELECT id FROM processing_queue
                ORDER BY priority DESC, enqueued_at ASC
                LIMIT 1
            )
            RETURNING id, frame_id, enqueued_at, priority, retry_count, last_error
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        sqlx::query("UPDATE frames SET processing_status = 'processing' WHERE id = ?")
            .bind(row.frame_id)
            .execute(&mut *tx)
            .await?;

        let frame = sqlx::query_as::<_, FrameRecord>(
            r#"
            SELECT id, segment_id, frame_index_in_segment, captured_at, display_id,
                   app_bundle_id, app_name, window_title, browser_url,
                   processing_status, source_kind, created_at
            FROM frames
            WHERE id = ?
            "#,
        )
        .bind(row.frame_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((row, frame)))
    }

    /// Puts a frame back on the queue after a transient failure, carrying
    /// the retry count and last error forward. The frame's status returns
    /// to `pending` so `list_crashed_processing_frames` never sees it.
    pub async fn requeue_frame(
        &self,
        frame_id: i64,
        enqueued_at: DateTime<Utc>,
        priority: i64,
        retry_count: i64,
        last_error: Option<&str>,
    ) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::Unavailable(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO processing_queue (frame_id, enqueued_at, priority, retry_count, last_error)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(frame_id) DO UPDATE SET
                enqueued_at = excluded.enqueued_at,
                priority = excluded.priority,
                retry_count = excluded.retry_count,
                last_error = excluded.last_error
            "#,
        )
        .bind(frame_id)
        .bind(enqueued_at)
        .bind(priority)
        .bind(retry_count)
        .bind(last_error)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE frames SET processing_status = 'pending' WHERE id = ?")
            .bind(frame_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn queue_depth(&self) -> Result<i64> {
        let depth = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM processing_queue")
            .fetch_one(self.pool())
            .await?;
        Ok(depth)
    }

    // ===== Extracted text / regions =====

    /// Writes the OCR result for a frame: replaces `extracted_text`,
    /// deletes any pre-existing regions for the frame and inserts the new
    /// ones, updates `frames.browser_url` when OCR/accessibility found one,
    /// and marks the frame `completed` - all in one transaction, so
    /// re-OCRing a frame (idempotence) never leaves stale regions behind.
    pub async fn write_extracted_text(
        &self,
        frame_id: i64,
        segment_id: i64,
        full_text: &str,
        chrome_text: &str,
        regions: &[NewRegion],
        browser_url: Option<&str>,
    ) -> Result<()> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::Unavailable(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO extracted_text (frame_id, segment_id, full_text, chrome_text)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(frame_id) DO UPDATE SET
                full_text = excluded.full_text,
                chrome_text = excluded.chrome_text,
                extracted_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(frame_id)
        .bind(segment_id)
        .bind(full_text)
        .bind(chrome_text)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM regions WHERE frame_id = ?")
            .bind(frame_id)
            .execute(&mut *tx)
            .await?;

        for region in regions {
            sqlx::query(
                r#"
                INSERT INTO regions (
                    frame_id, text_offset, text_length, x, y, width, height,
                    chrome_bit, window_index
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(frame_id)
            .bind(region.text_offset)
            .bind(region.text_length)
            .bind(region.x)
            .bind(region.y)
            .bind(region.width)
            .bind(region.height)
            .bind(region.chrome_bit as i64)
            .bind(region.window_index)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(url) = browser_url {
            sqlx::query("UPDATE frames SET browser_url = ? WHERE id = ?")
                .bind(url)
                .bind(frame_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE frames SET processing_status = 'completed' WHERE id = ?")
            .bind(frame_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn regions_for_frame(&self, frame_id: i64) -> Result<Vec<RegionRecord>> {
        let regions = sqlx::query_as::<_, RegionRecord>(
            r#"
            SELECT id, frame_id, text_offset, text_length, x, y, width, height,
                   chrome_bit, window_index
            FROM regions
            WHERE frame_id = ?
            ORDER BY y ASC, x ASC
            "#,
        )
        .bind(frame_id)
        .fetch_all(self.pool())
        .await?;
        Ok(regions)
    }

    pub async fn extracted_text_for_frame(
        &self,
        frame_id: i64,
    ) -> Result<Option<ExtractedTextRecord>> {
        let row = sqlx::query_as::<_, ExtractedTextRecord>(
            r#"
            SELECT frame_id, segment_id, full_text, chrome_text, extracted_at
            FROM extracted_text
            WHERE frame_id = ?
            "#,
        )
        .bind(frame_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Full-text search over `extracted_text_fts` with BM25 ranking. Not
    /// part of the query DSL surface (that's consumed by something
    /// downstream of this crate) - this is the primitive a DSL compiler
    /// would call.
    pub async fn search_extracted_text(
        &self,
        query: &str,
        pagination: Pagination,
    ) -> Result<Vec<(FrameRecord, f32)>> {
        let rows = sqlx::query(
            r#"
            SELECT
                f.id, f.segment_id, f.frame_index_in_segment, f.captured_at, f.display_id,
                f.app_bundle_id, f.app_name, f.window_title, f.browser_url,
                f.processing_status, f.source_kind, f.created_at,
                extracted_text_fts.rank AS rank
            FROM extracted_text_fts
            JOIN frames f ON extracted_text_fts.rowid = f.id
            WHERE extracted_text_fts MATCH ?
            ORDER BY extracted_text_fts.rank ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(query)
        .bind(pagination.limit)
        .bind(pagination.offset)
        .fetch_all(self.pool())
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let frame = FrameRecord {
                id: row.get("id"),
                segment_id: row.get("segment_id"),
                frame_index_in_segment: row.get("frame_index_in_segment"),
                captured_at: row.get("captured_at"),
                display_id: row.get("display_id"),
                app_bundle_id: row.get("app_bundle_id"),
                app_name: row.get("app_name"),
                window_title: row.get("window_title"),
                browser_url: row.get("browser_url"),
                processing_status: row.get("processing_status"),
                source_kind: row.get("source_kind"),
                created_at: row.get("created_at"),
            };
            let rank: f32 = row.get("rank");
            results.push((frame, -rank));
        }
        Ok(results)
    }

    // ===== Orphan reconciliation =====

    /// Defensive sweep for rows that should be unreachable given
    /// `ON DELETE CASCADE`, but might survive a crash mid-transaction on a
    /// SQLite build with foreign keys disabled. Safe to run on every
    /// startup.
    pub async fn sweep_orphan_rows(&self) -> Result<u64> {
        let mut total = 0u64;
        total += sqlx::query(
            "DELETE FROM regions WHERE frame_id NOT IN (SELECT id FROM frames)",
        )
        .execute(self.pool())
        .await?
        .rows_affected();

        total += sqlx::query(
            "DELETE FROM extracted_text WHERE frame_id NOT IN (SELECT id FROM frames)",
        )
        .execute(self.pool())
        .await?
        .rows_affected();

        total += sqlx::query(
            "DELETE FROM processing_queue WHERE frame_id NOT IN (SELECT id FROM frames)",
        )
        .execute(self.pool())
        .await?
        .rows_affected();

        total += sqlx::query(
            "DELETE FROM frames WHERE segment_id NOT IN (SELECT id FROM segments)",
        )
        .execute(self.pool())
        .await?
        .rows_affected();

        if total > 0 {
            tracing::info!(rows = total, "orphan sweep removed stale rows");
        }
        Ok(total)
    }

    // ===== Tag operations (kept for cascade coverage, not pipeline-facing) =====

    pub async fn create_tag(&self, tag: NewTag) -> Result<i64> {
        let result = sqlx::query("INSERT INTO tags (tag_name, description, color) VALUES (?, ?, ?)")
            .bind(tag.tag_name)
            .bind(tag.description)
            .bind(tag.color)
            .execute(self.pool())
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_tags_for_frame(&self, frame_id: i64) -> Result<Vec<TagRecord>> {
        let tags = sqlx::query_as::<_, TagRecord>(
            r#"
            SELECT t.id, t.tag_name, t.description, t.color, t.created_at
            FROM tags t
            JOIN frame_tags ft ON t.id = ft.tag_id
            WHERE ft.frame_id = ?
            ORDER BY t.tag_name
            "#,
        )
        .bind(frame_id)
        .fetch_all(self.pool())
        .await?;
        Ok(tags)
    }

    pub async fn add_tag_to_frame(&self, frame_id: i64, tag_id: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO frame_tags (frame_id, tag_id) VALUES (?, ?)")
            .bind(frame_id)
            .bind(tag_id)
            .execute(self.pool())
            .await?;
        Ok(result.last_insert_rowid())
    }

    // ===== Settings =====

    pub async fn get_settings(&self) -> Result<SettingsRecord> {
        let settings = sqlx::query_as::<_, SettingsRecord>(
            r#"
            SELECT id, capture_interval_ms, dedup_threshold, excluded_app_bundle_ids,
                   exclude_private_windows, capture_active_display_only, show_cursor,
                   max_resolution_width, max_resolution_height, accuracy,
                   recognition_languages, min_confidence, accessibility_enabled,
                   region_based_enabled, max_retries, worker_count, queue_max_depth,
                   retention_age_days, max_storage_gb, is_paused, updated_at
            FROM settings
            WHERE id = 1
            "#,
        )
        .fetch_one(self.pool())
        .await?;
        Ok(settings)
    }

    pub async fn update_settings(&self, settings: UpdateSettings) -> Result<SettingsRecord> {
        sqlx::query(
            r#"
            UPDATE settings
            SET capture_interval_ms = ?,
                dedup_threshold = ?,
                excluded_app_bundle_ids = ?,
                exclude_private_windows = ?,
                capture_active_display_only = ?,
                max_retries = ?,
                worker_count = ?,
                queue_max_depth = ?,
                retention_age_days = ?,
                max_storage_gb = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = 1
            "#,
        )
        .bind(settings.capture_interval_ms)
        .bind(settings.dedup_threshold)
        .bind(settings.excluded_app_bundle_ids)
        .bind(settings.exclude_private_windows)
        .bind(settings.capture_active_display_only)
        .bind(settings.max_retries)
        .bind(settings.worker_count)
        .bind(settings.queue_max_depth)
        .bind(settings.retention_age_days)
        .bind(settings.max_storage_gb)
        .execute(self.pool())
        .await?;

        self.get_settings().await
    }

    // ===== Statistics =====

    pub async fn get_statistics(&self) -> Result<DatabaseStatistics> {
        let frame_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM frames")
            .fetch_one(self.pool())
            .await?;
        let segment_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM segments")
            .fetch_one(self.pool())
            .await?;
        let queue_depth = self.queue_depth().await?;
        let oldest_frame =
            sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MIN(captured_at) FROM frames")
                .fetch_one(self.pool())
                .await?;
        let newest_frame =
            sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT MAX(captured_at) FROM frames")
                .fetch_one(self.pool())
                .await?;

        Ok(DatabaseStatistics {
            frame_count,
            segment_count,
            queue_depth,
            oldest_frame,
            newest_frame,
        })
    }
}

/// Catalog-wide statistics, surfaced for operator diagnostics.
#[derive(Debug, Clone)]
pub struct DatabaseStatistics {
    pub frame_count: i64,
    pub segment_count: i64,
    pub queue_depth: i64,
    pub oldest_frame: Option<DateTime<Utc>>,
    pub newest_frame: Option<DateTime<Utc>>,
}
