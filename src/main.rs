//! ScreenSearch - capture-to-index pipeline binary.
//!
//! Wires together every core component: `ScreenSource` captures ticks,
//! `FrameIngestor` dedups/segments/catalogs them, `OcrQueue` workers drain
//! the durable queue through `TextExtractor`, and `RetentionEnforcer` sweeps
//! the catalog and storage root on a schedule. No GUI, tray icon, settings
//! surface, or HTTP query layer lives here - those are external collaborators
//! per spec.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use screensearch_capture::{
    ActiveDisplayTracker, CaptureTickConfig, WindowsScreenSource,
};
use screensearch_core::clock::SystemClock;
use screensearch_db::{DatabaseConfig, DatabaseManager};
use screensearch_ingest::{FrameIngestor, IngestConfig, RetentionConfig, RetentionEnforcer};
use screensearch_ocr::{AccessibilityProvider, ExtractorConfig, TextExtractor, UiAutomationProvider};
use screensearch_queue::{OcrQueue, OcrQueueConfig};
use screensearch_store::SegmentStore;

/// Application configuration loaded from `config.toml`, falling back to
/// defaults for anything unset or for a missing file entirely.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct AppConfig {
    storage: StorageSettings,
    capture: CaptureSettings,
    ocr: OcrSettings,
    ingest: IngestSettings,
    queue: QueueSettings,
    retention: RetentionSettings,
    database: DatabaseSettings,
    logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct StorageSettings {
    /// Root directory under which `segments/`, `db`, and `temp/` live
    /// (spec.md §6's storage root layout).
    root: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "./screensearch-data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct CaptureSettings {
    capture_interval_seconds: u64,
    excluded_app_bundle_ids: Vec<String>,
    exclude_private_windows: bool,
    capture_active_display_only: bool,
    active_display_poll_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_interval_seconds: 3,
            excluded_app_bundle_ids: vec![
                "1Password".to_string(),
                "KeePass".to_string(),
                "Bitwarden".to_string(),
            ],
            exclude_private_windows: true,
            capture_active_display_only: false,
            active_display_poll_ms: 500,
        }
    }
}

/// Corresponds to spec.md §3's `OcrConfig`. Only the first entry of
/// `recognition_languages` is honored today - `WindowsOcrRecognizer` wraps a
/// single engine instance per process; a multi-language fallback chain is
/// future work, not something SPEC_FULL.md requires.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct OcrSettings {
    recognition_languages: Vec<String>,
    min_confidence: f32,
    accessibility_enabled: bool,
    region_based_enabled: bool,
    tile_grid_cols: u32,
    tile_grid_rows: u32,
    extract_urls: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            recognition_languages: Vec::new(),
            min_confidence: 0.5,
            accessibility_enabled: true,
            region_based_enabled: true,
            tile_grid_cols: 4,
            tile_grid_rows: 4,
            extract_urls: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct IngestSettings {
    deduplicate: bool,
    dedup_threshold: f32,
    segment_max_duration_secs: u64,
    segment_max_frames: u32,
    flush_every_frames: u32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        let d = IngestConfig::default();
        Self {
            deduplicate: d.deduplicate,
            dedup_threshold: d.dedup_threshold,
            segment_max_duration_secs: d.segment_max_duration.as_secs(),
            segment_max_frames: d.segment_max_frames,
            flush_every_frames: d.flush_every_frames,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct QueueSettings {
    worker_count: usize,
    max_retries: i64,
    queue_max_depth: i64,
    poll_interval_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        let d = OcrQueueConfig::default();
        Self {
            worker_count: d.worker_count,
            max_retries: d.max_retries,
            queue_max_depth: d.queue_max_depth,
            poll_interval_ms: d.poll_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RetentionSettings {
    retention_age_days: i64,
    max_storage_gb: f64,
    sweep_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        let d = RetentionConfig::default();
        Self {
            retention_age_days: d.retention_age_days,
            max_storage_gb: d.max_storage_gb,
            sweep_interval_secs: d.sweep_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DatabaseSettings {
    max_connections: u32,
    min_connections: u32,
    acquire_timeout_secs: u64,
    enable_wal: bool,
    cache_size_kb: i32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        let d = DatabaseConfig::default();
        Self {
            max_connections: d.max_connections,
            min_connections: d.min_connections,
            acquire_timeout_secs: d.acquire_timeout_secs,
            enable_wal: d.enable_wal,
            cache_size_kb: d.cache_size_kb,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct LoggingSettings {
    level: String,
    log_to_file: bool,
    log_dir: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_dir: "./screensearch-data/logs".to_string(),
        }
    }
}

impl AppConfig {
    fn load() -> Self {
        let path = PathBuf::from("config.toml");
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(&path).and_then(|s| {
            toml::from_str(&s).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("config.toml invalid ({e}), falling back to defaults");
                Self::default()
            }
        }
    }
}

/// Keeps the non-blocking file-log writer guard alive for the process
/// lifetime; dropping it flushes and stops the background writer thread.
fn init_tracing(config: &LoggingSettings) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).with_line_number(true);

    if config.log_to_file {
        std::fs::create_dir_all(&config.log_dir).context("creating log directory")?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "screensearch.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        Ok(None)
    }
}

/// Reconciles the storage root against the catalog in both directions:
/// `Catalog::sweep_orphan_rows` handles rows without files (cascade
/// survivors from a crash mid-transaction); this half handles the opposite
/// - segment files on disk with no matching `segments` row, left behind by
/// a crash between `SegmentStore::open_segment` and the catalog insert that
/// names it (spec.md §4.7's ordering note).
async fn sweep_orphan_segment_files(db: &DatabaseManager, store: &SegmentStore) -> Result<u64> {
    use std::collections::HashSet;

    let known: HashSet<String> = db
        .all_segment_paths()
        .await?
        .into_iter()
        .map(|(_, path)| path)
        .collect();

    let root = store.root().to_path_buf();
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0u64;
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "orphan sweep could not read directory");
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Ok(relative) = path.strip_prefix(&root) else { continue };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !known.contains(&relative) {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove orphan segment file");
                } else {
                    removed += 1;
                }
            }
        }
    }
    if removed > 0 {
        info!(removed, "orphan sweep removed segment files with no catalog row");
    }
    Ok(removed)
}

fn build_extractor_config(ocr: &OcrSettings) -> ExtractorConfig {
    // `region_based_enabled = false` means OCR the whole frame as a single
    // tile rather than the usual grid - still goes through `FullFrameCache`,
    // just with one cache entry per frame instead of one per tile.
    let tile_grid = if ocr.region_based_enabled {
        (ocr.tile_grid_cols.max(1), ocr.tile_grid_rows.max(1))
    } else {
        (1, 1)
    };
    ExtractorConfig {
        tile_grid,
        use_accessibility: ocr.accessibility_enabled,
        extract_urls: ocr.extract_urls,
        min_confidence: ocr.min_confidence,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting screensearch");

    let root = PathBuf::from(&config.storage.root);
    std::fs::create_dir_all(&root).context("creating storage root")?;
    std::fs::create_dir_all(root.join("temp")).context("creating temp staging directory")?;

    let db_config = DatabaseConfig {
        path: root.join("db").to_string_lossy().to_string(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        acquire_timeout_secs: config.database.acquire_timeout_secs,
        enable_wal: config.database.enable_wal,
        cache_size_kb: config.database.cache_size_kb,
    };
    let db = Arc::new(
        DatabaseManager::with_config(db_config)
            .await
            .context("opening catalog")?,
    );
    let store = Arc::new(SegmentStore::new(root.join("segments")).context("opening segment store")?);

    // Startup reconciliation (spec.md §6): orphan sweep in both directions,
    // then crash recovery for anything stuck `processing`.
    db.sweep_orphan_rows().await.context("sweeping orphan catalog rows")?;
    sweep_orphan_segment_files(&db, &store).await.context("sweeping orphan segment files")?;

    let recognizer: Arc<dyn screensearch_ocr::TextRecognizer> =
        match config.ocr.recognition_languages.first() {
            Some(tag) => Arc::new(
                screensearch_ocr::WindowsOcrRecognizer::new_with_language(tag)
                    .context("creating OCR engine for configured language")?,
            ),
            None => Arc::new(
                screensearch_ocr::WindowsOcrRecognizer::new()
                    .context("creating OCR engine from user profile languages")?,
            ),
        };
    let accessibility: Arc<dyn AccessibilityProvider> = Arc::new(UiAutomationProvider::new());
    let extractor = Arc::new(TextExtractor::new(
        build_extractor_config(&config.ocr),
        recognizer,
        accessibility,
    ));

    let queue_config = OcrQueueConfig {
        worker_count: config.queue.worker_count,
        max_retries: config.queue.max_retries,
        queue_max_depth: config.queue.queue_max_depth,
        poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
        ..OcrQueueConfig::default()
    };
    let queue = Arc::new(OcrQueue::new(db.clone(), store.clone(), extractor, queue_config));

    // Crash recovery: anything left `processing` from a prior run either
    // gets reset to `pending` and re-enqueued, or is terminal-failed if its
    // segment is gone (spec.md §4.8).
    let recovered = queue.requeue_crashed().await.context("recovering crashed OCR work")?;
    if recovered > 0 {
        info!(recovered, "reset crashed frames to pending and re-enqueued");
    }
    queue.mark_ready();
    let worker_pool = queue.clone().spawn();

    // The tracker runs regardless of `capture_active_display_only`: besides
    // publishing the active display (consulted only when that flag is set),
    // it is the source of the focused-window-changed signal that drives
    // off-schedule capture (spec.md §4.5's `on_window_changed`).
    let (display_tracker, events) =
        ActiveDisplayTracker::start(Duration::from_millis(config.capture.active_display_poll_ms));
    let display_tracker = Arc::new(display_tracker);

    // `ScreenSource` only drains one off-schedule trigger stream; merge the
    // tracker's display-changed and window-changed channels into it so both
    // kinds of focus event can fire an early capture.
    let (capture_trigger_tx, capture_trigger_rx) = tokio::sync::mpsc::unbounded_channel();
    {
        let mut display_changed = events.display_changed;
        let mut window_changed = events.window_changed;
        let tx = capture_trigger_tx;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(new_display) = display_changed.recv() => {
                        tracing::debug!(display = new_display.0, "active display changed");
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    Some(()) = window_changed.recv() => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });
    }

    let tick_config = CaptureTickConfig {
        capture_interval: Duration::from_secs(config.capture.capture_interval_seconds),
        excluded_app_bundle_ids: config.capture.excluded_app_bundle_ids.clone(),
        exclude_private_windows: config.capture.exclude_private_windows,
        capture_active_display_only: config.capture.capture_active_display_only,
    };
    let source = Box::new(WindowsScreenSource::new(
        tick_config,
        Some(display_tracker),
        Some(capture_trigger_rx),
    ));

    let ingest_config = IngestConfig {
        deduplicate: config.ingest.deduplicate,
        dedup_threshold: config.ingest.dedup_threshold,
        segment_max_duration: Duration::from_secs(config.ingest.segment_max_duration_secs),
        segment_max_frames: config.ingest.segment_max_frames,
        flush_every_frames: config.ingest.flush_every_frames,
        ..IngestConfig::default()
    };
    let clock = Arc::new(SystemClock);
    let ingestor = Arc::new(FrameIngestor::new(
        db.clone(),
        store.clone(),
        queue.clone(),
        clock,
        ingest_config,
    ));

    let retention_config = RetentionConfig {
        retention_age_days: config.retention.retention_age_days,
        max_storage_gb: config.retention.max_storage_gb,
        sweep_interval: Duration::from_secs(config.retention.sweep_interval_secs),
    };
    let retention = Arc::new(RetentionEnforcer::new(db.clone(), store.clone(), retention_config));

    let capture_shutdown = Arc::new(AtomicBool::new(false));
    let retention_shutdown = Arc::new(AtomicBool::new(false));

    let ingest_handle = {
        let ingestor = ingestor.clone();
        let shutdown = capture_shutdown.clone();
        tokio::spawn(async move { ingestor.run(source, shutdown).await })
    };
    let retention_handle = {
        let retention = retention.clone();
        let shutdown = retention_shutdown.clone();
        tokio::spawn(async move { retention.run(shutdown).await })
    };

    info!("screensearch running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested, draining pipeline");

    capture_shutdown.store(true, Ordering::Relaxed);
    retention_shutdown.store(true, Ordering::Relaxed);

    if let Err(e) = ingest_handle.await {
        error!(error = %e, "ingest task panicked during shutdown");
    }
    if let Err(e) = retention_handle.await {
        error!(error = %e, "retention task panicked during shutdown");
    }
    worker_pool.shutdown().await;

    match Arc::try_unwrap(db) {
        Ok(db) => db.close().await,
        Err(db) => warn!(
            strong_count = Arc::strong_count(&db),
            "catalog still has outstanding references at shutdown, skipping explicit close"
        ),
    }

    info!("screensearch stopped");
    Ok(())
}

fn main() -> Result<()> {
    let config = AppConfig::load();
    let _log_guard = init_tracing(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(run(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_local_storage_root() {
        let config = AppConfig::default();
        assert_eq!(config.storage.root, "./screensearch-data");
        assert!(config.ingest.deduplicate);
        assert_eq!(config.queue.worker_count, OcrQueueConfig::default().worker_count);
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        // AppConfig::load() checks the file system for "config.toml" in the
        // current directory; when it legitimately doesn't exist (the common
        // case for a fresh checkout), defaults must still produce a usable
        // config rather than erroring.
        let config = AppConfig::default();
        assert!(config.retention.retention_age_days >= 0);
    }
}
