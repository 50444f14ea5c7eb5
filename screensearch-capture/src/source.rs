//! `ScreenSource`: per-tick capture with exclusion painting.
//!
//! A single pull-based trait so `screensearch-ingest` controls pacing
//! instead of a background thread racing a channel.

use crate::{private_windows, window_enum, CaptureError, Result};
use async_trait::async_trait;
use screensearch_core::types::{CapturedFrame, DisplayId, FrameMetadata, PixelBuffer, PixelFormat};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Per-tick capture configuration: what to exclude and how.
#[derive(Debug, Clone)]
pub struct CaptureTickConfig {
    /// Polling period between ticks.
    pub capture_interval: Duration,
    /// App bundle ids (process names on Windows) never captured.
    pub excluded_app_bundle_ids: Vec<String>,
    /// When true, windows classified private by `private_windows` are
    /// also excluded, in addition to `excluded_app_bundle_ids`.
    pub exclude_private_windows: bool,
    /// When true, only the display reported by `ActiveDisplayTracker` is
    /// captured; otherwise every display is captured each tick.
    pub capture_active_display_only: bool,
}

impl Default for CaptureTickConfig {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_secs(3),
            excluded_app_bundle_ids: Vec::new(),
            exclude_private_windows: true,
            capture_active_display_only: false,
        }
    }
}

/// A source of capture ticks. `WindowsScreenSource` is the only
/// implementation today; the trait boundary exists so `screensearch-ingest`
/// never references the `windows` crate directly.
#[async_trait]
pub trait ScreenSource: Send {
    /// Produces the next tick's frame(s), or `None` once `stop` has been
    /// called and no more ticks will come. One call captures every target
    /// display for this tick.
    async fn next_tick(&mut self) -> Result<Vec<CapturedFrame>>;

    /// Signals the source to wind down; the in-flight `next_tick` (if any)
    /// still completes, but subsequent calls return an empty vec.
    fn stop(&self);
}

pub struct WindowsScreenSource {
    config: CaptureTickConfig,
    running: Arc<AtomicBool>,
    active_display: Option<Arc<crate::display_tracker::ActiveDisplayTracker>>,
    // Draining this triggers an off-schedule tick the moment the focused
    // window changes, rather than waiting for `capture_interval` to elapse
    // (spec.md §4.5's `on_window_changed`).
    window_changed: Option<mpsc::UnboundedReceiver<()>>,
    // Built lazily on the first `next_tick` call rather than in `new`:
    // `tokio::time::interval` requires a runtime context, and `new` is
    // plain sync code callers may construct this from outside one.
    interval: Option<tokio::time::Interval>,
}

impl WindowsScreenSource {
    pub fn new(
        config: CaptureTickConfig,
        active_display: Option<Arc<crate::display_tracker::ActiveDisplayTracker>>,
        window_changed: Option<mpsc::UnboundedReceiver<()>>,
    ) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
            active_display,
            window_changed,
            interval: None,
        }
    }

    /// A tick captures exactly one display: the tracked active one when
    /// `capture_active_display_only`, otherwise the main display (index
    /// `0`) - never every connected display at once (spec.md §4.4 step 1).
    fn target_display(&self) -> DisplayId {
        if self.config.capture_active_display_only {
            self.active_display
                .as_ref()
                .map(|t| t.current_display())
                .unwrap_or(DisplayId(0))
        } else {
            DisplayId(0)
        }
    }

    fn capture_display(&self, display_id: DisplayId) -> Result<CapturedFrame> {
        let screens = screenshots::Screen::all()
            .map_err(|e| CaptureError::ScreenCaptureError(format!("enumerate screens: {}", e)))?;
        let screen = screens
            .get(display_id.0 as usize)
            .ok_or(CaptureError::InvalidDisplay(display_id.0))?;

        let captured = screen
            .capture()
            .map_err(|e| CaptureError::ScreenCaptureError(format!("capture failed: {}", e)))?;
        let width = captured.width();
        let height = captured.height();
        let data = captured.into_raw();
        let mut pixels = PixelBuffer::new(width, height, PixelFormat::Bgra8, data);

        let windows = window_enum::enumerate_windows().unwrap_or_default();
        for rect in self.visible_excluded_rects(&windows) {
            let (x, y) = (rect.x.max(0) as u32, rect.y.max(0) as u32);
            pixels.blackout(x, y, rect.width, rect.height);
        }

        let focused = windows.first();
        let metadata = FrameMetadata {
            app_bundle_id: focused.and_then(|w| w.owner_bundle_id.clone()),
            app_name: focused.and_then(|w| w.owner_process_name.clone()),
            window_title: focused.and_then(|w| w.title.clone()),
            browser_url: None,
        };

        Ok(CapturedFrame {
            captured_at: chrono::Utc::now(),
            display_id,
            pixels,
            metadata,
        })
    }

    /// Windows to black out: explicitly excluded bundle ids, plus windows
    /// classified as private when the config asks for it.
    fn exclusion_set<'a>(
        &self,
        windows: &'a [screensearch_core::types::WindowInfo],
    ) -> Vec<&'a screensearch_core::types::WindowInfo> {
        windows.iter().filter(|w| self.is_excluded(w)).collect()
    }

    fn is_excluded(&self, w: &screensearch_core::types::WindowInfo) -> bool {
        let excluded_by_bundle = w
            .owner_process_name
            .as_deref()
            .map(|name| {
                self.config
                    .excluded_app_bundle_ids
                    .iter()
                    .any(|b| b.eq_ignore_ascii_case(name))
            })
            .unwrap_or(false);

        let excluded_by_privacy = self.config.exclude_private_windows
            && w.owner_process_name.as_deref().is_some_and(|name| {
                private_windows::is_private_window(name, w.title.as_deref().unwrap_or(""))
            });

        excluded_by_bundle || excluded_by_privacy
    }

    /// For every excluded window, subtracts the bounds of every window
    /// stacked in front of it (earlier in `windows`, which is front-to-back
    /// ordered) and returns whatever rectangles of the excluded window
    /// remain visible. A window fully covered by ones in front contributes
    /// nothing - there is nothing on screen left to redact.
    fn visible_excluded_rects(
        &self,
        windows: &[screensearch_core::types::WindowInfo],
    ) -> Vec<screensearch_core::types::Rect> {
        if windows.iter().all(|w| !self.is_excluded(w)) {
            return Vec::new();
        }

        let mut out = Vec::new();
        for (i, w) in windows.iter().enumerate() {
            if !self.is_excluded(w) {
                continue;
            }
            let mut remaining = vec![w.bounds];
            for occluder in &windows[..i] {
                if occluder.alpha == 0 || !occluder.is_on_screen {
                    continue;
                }
                remaining = remaining
                    .iter()
                    .flat_map(|r| r.subtract(&occluder.bounds))
                    .collect();
                if remaining.is_empty() {
                    break;
                }
            }
            out.extend(remaining);
        }
        out
    }
}

#[async_trait]
impl ScreenSource for WindowsScreenSource {
    async fn next_tick(&mut self) -> Result<Vec<CapturedFrame>> {
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(self.config.capture_interval);
            // A slow downstream consumer should never cause a burst of
            // catch-up ticks - drop ticks rather than buffer unboundedly;
            // skipping missed ticks keeps the cadence steady.
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });

        // A focused-window change fires this tick off schedule; either way
        // the interval is reset so the next regularly-scheduled tick isn't
        // immediately followed by another one.
        match self.window_changed.as_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = interval.tick() => {}
                    Some(()) = rx.recv() => {
                        interval.reset();
                    }
                }
            }
            None => interval.tick().await,
        }

        if !self.running.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }

        let display_id = self.target_display();
        let mut frames = Vec::with_capacity(1);
        match self.capture_display(display_id) {
            Ok(frame) => frames.push(frame),
            Err(e) => tracing::warn!(display = display_id.0, "capture failed: {}", e),
        }

        Ok(frames)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_set_matches_on_process_name_case_insensitively() {
        let source = WindowsScreenSource::new(
            CaptureTickConfig {
                excluded_app_bundle_ids: vec!["Signal.exe".to_string()],
                exclude_private_windows: false,
                capture_active_display_only: false,
                ..CaptureTickConfig::default()
            },
            None,
            None,
        );
        let windows = vec![screensearch_core::types::WindowInfo {
            bounds: screensearch_core::types::Rect { x: 0, y: 0, width: 10, height: 10 },
            owner_pid: 1,
            owner_bundle_id: None,
            owner_process_name: Some("signal.exe".to_string()),
            title: Some("Signal".to_string()),
            layer: 0,
            alpha: 255,
            is_on_screen: true,
        }];
        assert_eq!(source.exclusion_set(&windows).len(), 1);
    }

    #[test]
    fn exclusion_set_excludes_private_windows_when_configured() {
        let source = WindowsScreenSource::new(
            CaptureTickConfig {
                excluded_app_bundle_ids: Vec::new(),
                exclude_private_windows: true,
                capture_active_display_only: false,
                ..CaptureTickConfig::default()
            },
            None,
            None,
        );
        let windows = vec![screensearch_core::types::WindowInfo {
            bounds: screensearch_core::types::Rect { x: 0, y: 0, width: 10, height: 10 },
            owner_pid: 1,
            owner_bundle_id: None,
            owner_process_name: Some("chrome.exe".to_string()),
            title: Some("example.com - Google Chrome (Incognito)".to_string()),
            layer: 0,
            alpha: 255,
            is_on_screen: true,
        }];
        assert_eq!(source.exclusion_set(&windows).len(), 1);
    }

    #[test]
    fn exclusion_set_is_empty_when_nothing_matches() {
        let source = WindowsScreenSource::new(CaptureTickConfig::default(), None, None);
        let windows = vec![screensearch_core::types::WindowInfo {
            bounds: screensearch_core::types::Rect { x: 0, y: 0, width: 10, height: 10 },
            owner_pid: 1,
            owner_bundle_id: None,
            owner_process_name: Some("explorer.exe".to_string()),
            title: Some("File Explorer".to_string()),
            layer: 0,
            alpha: 255,
            is_on_screen: true,
        }];
        assert!(source.exclusion_set(&windows).is_empty());
    }

    fn window(bounds: screensearch_core::types::Rect, process: &str, alpha: u8) -> screensearch_core::types::WindowInfo {
        screensearch_core::types::WindowInfo {
            bounds,
            owner_pid: 1,
            owner_bundle_id: None,
            owner_process_name: Some(process.to_string()),
            title: None,
            layer: 0,
            alpha,
            is_on_screen: true,
        }
    }

    #[test]
    fn fully_covered_excluded_window_contributes_no_rects() {
        let source = WindowsScreenSource::new(
            CaptureTickConfig {
                excluded_app_bundle_ids: vec!["signal.exe".to_string()],
                exclude_private_windows: false,
                capture_active_display_only: false,
                ..CaptureTickConfig::default()
            },
            None,
            None,
        );
        use screensearch_core::types::Rect;
        let windows = vec![
            // frontmost: a fully opaque browser window covering the excluded one.
            window(Rect { x: -5, y: -5, width: 30, height: 30 }, "chrome.exe", 255),
            window(Rect { x: 0, y: 0, width: 10, height: 10 }, "signal.exe", 255),
        ];
        assert!(source.visible_excluded_rects(&windows).is_empty());
    }

    #[test]
    fn partially_covered_excluded_window_leaves_the_uncovered_remainder() {
        let source = WindowsScreenSource::new(
            CaptureTickConfig {
                excluded_app_bundle_ids: vec!["signal.exe".to_string()],
                exclude_private_windows: false,
                capture_active_display_only: false,
                ..CaptureTickConfig::default()
            },
            None,
            None,
        );
        use screensearch_core::types::Rect;
        let windows = vec![
            window(Rect { x: 5, y: 5, width: 10, height: 10 }, "chrome.exe", 255),
            window(Rect { x: 0, y: 0, width: 10, height: 10 }, "signal.exe", 255),
        ];
        let remaining = source.visible_excluded_rects(&windows);
        let area: u32 = remaining.iter().map(|r| r.width * r.height).sum();
        assert_eq!(area, 100 - 25);
    }

    #[test]
    fn transparent_occluder_does_not_shrink_the_excluded_region() {
        let source = WindowsScreenSource::new(
            CaptureTickConfig {
                excluded_app_bundle_ids: vec!["signal.exe".to_string()],
                exclude_private_windows: false,
                capture_active_display_only: false,
                ..CaptureTickConfig::default()
            },
            None,
            None,
        );
        use screensearch_core::types::Rect;
        let windows = vec![
            window(Rect { x: 0, y: 0, width: 10, height: 10 }, "overlay.exe", 0),
            window(Rect { x: 0, y: 0, width: 10, height: 10 }, "signal.exe", 255),
        ];
        let remaining = source.visible_excluded_rects(&windows);
        let area: u32 = remaining.iter().map(|r| r.width * r.height).sum();
        assert_eq!(area, 100);
    }

    #[test]
    fn no_excluded_windows_yields_no_painted_rects() {
        let source = WindowsScreenSource::new(CaptureTickConfig::default(), None, None);
        use screensearch_core::types::Rect;
        let windows = vec![window(Rect { x: 0, y: 0, width: 10, height: 10 }, "explorer.exe", 255)];
        assert!(source.visible_excluded_rects(&windows).is_empty());
    }
}
