//! Database migrations
//!
//! Manages application of SQL migrations to ensure schema consistency.
//! Migrations are applied in order and tracked in the _migrations table.

use crate::Result;
use sqlx::{Pool, Sqlite};

/// Run all database migrations
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    tracing::debug!("initializing migrations table");

    // Create migrations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        tracing::error!("failed to create migrations table: {}", e);
        crate::DatabaseError::MigrationError(format!("failed to create migrations table: {}", e))
    })?;

    // Apply migrations in order - ensure order is maintained for dependencies
    apply_migration(pool, "001_initial_schema", MIGRATION_001_INITIAL).await?;
    apply_migration(pool, "002_settings_table", MIGRATION_002_SETTINGS).await?;
    apply_migration(pool, "003_tags", MIGRATION_003_TAGS).await?;

    tracing::info!("all migrations completed successfully");
    Ok(())
}

/// Apply a single migration if not already applied
async fn apply_migration(pool: &Pool<Sqlite>, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _migrations WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            tracing::error!("failed to check migration status for {}: {}", name, e);
            crate::DatabaseError::MigrationError(format!(
                "failed to check migration status: {}",
                e
            ))
        })?;

    if exists == 0 {
        tracing::info!("applying migration: {}", name);

        // For SQLite, execute the entire migration as one block
        // SQLite supports multiple statements when sent via query
        let mut conn = pool.acquire().await.map_err(|e| {
            tracing::error!("failed to acquire connection for migration: {}", e);
            crate::DatabaseError::MigrationError(format!("failed to acquire connection: {}", e))
        })?;

        // Execute the full SQL migration
        sqlx::raw_sql(sql).execute(&mut *conn).await.map_err(|e| {
            tracing::error!("failed to execute migration {}: {}", name, e);
            crate::DatabaseError::MigrationError(format!(
                "failed to execute migration {}: {}",
                name, e
            ))
        })?;

        // Record migration
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(pool)
            .await
            .map_err(|e| {
                tracing::error!("failed to record migration {}: {}", name, e);
                crate::DatabaseError::MigrationError(format!("failed to record migration: {}", e))
            })?;

        tracing::info!("migration {} applied successfully", name);
    } else {
        tracing::debug!("migration {} already applied, skipping", name);
    }

    Ok(())
}

/// Initial schema migration - segments, frames, the OCR queue, extracted
/// text + its FTS5 index, and regions.
const MIGRATION_001_INITIAL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA cache_size = -2000;
PRAGMA temp_store = MEMORY;
PRAGMA synchronous = NORMAL;
PRAGMA query_only = FALSE;

-- Segments: one compressed video file per contiguous run of frames at a
-- single resolution, on a single display - a display or resolution change
-- always closes the current segment before a new one opens.
CREATE TABLE IF NOT EXISTS segments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    opened_at DATETIME NOT NULL,
    closed_at DATETIME,
    relative_path TEXT NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    display_id INTEGER NOT NULL,
    frame_count INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(relative_path)
);

CREATE INDEX IF NOT EXISTS idx_segments_opened_at ON segments(opened_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_segments_open_by_resolution
    ON segments(width, height)
    WHERE closed_at IS NULL;

-- Frames: one row per captured tick, always pointing at the segment that
-- holds its pixels.
CREATE TABLE IF NOT EXISTS frames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    segment_id INTEGER NOT NULL REFERENCES segments(id) ON DELETE CASCADE,
    frame_index_in_segment INTEGER NOT NULL,
    captured_at DATETIME NOT NULL,
    display_id INTEGER NOT NULL,
    app_bundle_id TEXT,
    app_name TEXT,
    window_title TEXT,
    browser_url TEXT,
    processing_status TEXT NOT NULL DEFAULT 'pending',
    source_kind TEXT NOT NULL DEFAULT 'native',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(segment_id, frame_index_in_segment)
);

CREATE INDEX IF NOT EXISTS idx_frames_captured_at ON frames(captured_at DESC);
CREATE INDEX IF NOT EXISTS idx_frames_app_bundle ON frames(app_bundle_id);
CREATE INDEX IF NOT EXISTS idx_frames_browser_url ON frames(browser_url);
CREATE INDEX IF NOT EXISTS idx_frames_status ON frames(processing_status);
CREATE INDEX IF NOT EXISTS idx_frames_segment ON frames(segment_id);

-- Processing queue: durable, priority-ordered work list for OCR. Survives
-- a process crash because it is the database, not an in-memory channel.
CREATE TABLE IF NOT EXISTS processing_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    frame_id INTEGER NOT NULL UNIQUE REFERENCES frames(id) ON DELETE CASCADE,
    enqueued_at DATETIME NOT NULL,
    priority INTEGER NOT NULL DEFAULT 0,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT
);

CREATE INDEX IF NOT EXISTS idx_queue_dequeue_order
    ON processing_queue(priority DESC, enqueued_at ASC);

-- Extracted text: one row per frame that has completed OCR, holding both
-- the full merged text and the chrome-only (browser UI) slice used for
-- URL extraction.
CREATE TABLE IF NOT EXISTS extracted_text (
    frame_id INTEGER PRIMARY KEY REFERENCES frames(id) ON DELETE CASCADE,
    segment_id INTEGER NOT NULL,
    full_text TEXT NOT NULL DEFAULT '',
    chrome_text TEXT NOT NULL DEFAULT '',
    extracted_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE VIRTUAL TABLE IF NOT EXISTS extracted_text_fts USING fts5(
    full_text,
    chrome_text,
    content='extracted_text',
    content_rowid='frame_id',
    tokenize = 'porter'
);

CREATE TRIGGER IF NOT EXISTS extracted_text_ai AFTER INSERT ON extracted_text BEGIN
    INSERT INTO extracted_text_fts(rowid, full_text, chrome_text)
    VALUES (new.frame_id, new.full_text, new.chrome_text);
END;

CREATE TRIGGER IF NOT EXISTS extracted_text_ad AFTER DELETE ON extracted_text BEGIN
    DELETE FROM extracted_text_fts WHERE rowid = old.frame_id;
END;

CREATE TRIGGER IF NOT EXISTS extracted_text_au AFTER UPDATE ON extracted_text BEGIN
    DELETE FROM extracted_text_fts WHERE rowid = old.frame_id;
    INSERT INTO extracted_text_fts(rowid, full_text, chrome_text)
    VALUES (new.frame_id, new.full_text, new.chrome_text);
END;

-- Regions: per-paragraph OCR bounding boxes, offset/length into
-- extracted_text.full_text so a search hit can be mapped back to a
-- rectangle on the frame.
CREATE TABLE IF NOT EXISTS regions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    frame_id INTEGER NOT NULL REFERENCES frames(id) ON DELETE CASCADE,
    text_offset INTEGER NOT NULL,
    text_length INTEGER NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    chrome_bit INTEGER NOT NULL DEFAULT 0,
    window_index INTEGER
);

CREATE INDEX IF NOT EXISTS idx_regions_frame_id ON regions(frame_id);

-- Frame-count bookkeeping on segments, kept current by a trigger so
-- closing a segment never has to COUNT(*) its frames.
CREATE TRIGGER IF NOT EXISTS frames_ai_bump_segment_count AFTER INSERT ON frames BEGIN
    UPDATE segments SET frame_count = frame_count + 1 WHERE id = new.segment_id;
END;

-- Metadata table for storing free-form application state.
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Settings table migration - persisted CaptureConfig/RetentionConfig/OcrConfig
const MIGRATION_002_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    capture_interval_ms INTEGER NOT NULL DEFAULT 3000,
    dedup_threshold REAL NOT NULL DEFAULT 0.97,
    excluded_app_bundle_ids TEXT NOT NULL DEFAULT '[]',
    exclude_private_windows INTEGER NOT NULL DEFAULT 1,
    capture_active_display_only INTEGER NOT NULL DEFAULT 0,
    show_cursor INTEGER NOT NULL DEFAULT 0,
    max_resolution_width INTEGER NOT NULL DEFAULT 1920,
    max_resolution_height INTEGER NOT NULL DEFAULT 1080,
    accuracy TEXT NOT NULL DEFAULT 'balanced',
    recognition_languages TEXT NOT NULL DEFAULT '["en-US"]',
    min_confidence REAL NOT NULL DEFAULT 0.0,
    accessibility_enabled INTEGER NOT NULL DEFAULT 1,
    region_based_enabled INTEGER NOT NULL DEFAULT 1,
    max_retries INTEGER NOT NULL DEFAULT 3,
    worker_count INTEGER NOT NULL DEFAULT 2,
    queue_max_depth INTEGER NOT NULL DEFAULT 500,
    retention_age_days INTEGER NOT NULL DEFAULT 30,
    max_storage_gb REAL NOT NULL DEFAULT 50.0,
    is_paused INTEGER NOT NULL DEFAULT 0,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

INSERT OR IGNORE INTO settings (id) VALUES (1);
"#;

/// Tags migration - user annotation, kept for cascade coverage during
/// retention even though the capture-to-index pipeline never writes to it.
const MIGRATION_003_TAGS: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_name TEXT NOT NULL UNIQUE,
    description TEXT,
    color TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_tags_name ON tags(tag_name);

CREATE TABLE IF NOT EXISTS frame_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    frame_id INTEGER NOT NULL REFERENCES frames(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(frame_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_frame_tags_frame_id ON frame_tags(frame_id);
CREATE INDEX IF NOT EXISTS idx_frame_tags_tag_id ON frame_tags(tag_id);
"#;
