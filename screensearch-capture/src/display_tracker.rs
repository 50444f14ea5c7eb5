//! Active-display and focused-window tracking via UI Automation/foreground
//! window polling.
//!
//! Watches focus-changed events and republishes both the active display
//! and a window-change signal, while avoiding a cyclic reference between
//! the tracker and `ScreenSource`: the tracker owns the `mpsc` senders,
//! `ScreenSource` owns the receivers, and `current_display()` is a plain
//! atomic load rather than a call back into the tracker's event loop.

use screensearch_core::types::DisplayId;
use std::sync::atomic::{AtomicI64, AtomicIsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use windows::Win32::Foundation::{BOOL, LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, MonitorFromWindow, HDC, HMONITOR, MONITORINFOEXW,
    MONITOR_DEFAULTTOPRIMARY,
};
use windows::Win32::UI::WindowsAndMessaging::GetForegroundWindow;

#[derive(Debug, Error)]
pub enum DisplayTrackerError {
    #[error("accessibility permission denied")]
    PermissionDenied,
    #[error("windows api error: {0}")]
    WindowsApiError(String),
}

/// The receiving side of the two channels `ActiveDisplayTracker::start`
/// publishes to.
pub struct DisplayTrackerEvents {
    /// Fires with the new display id whenever the focused window moves to
    /// a different display (spec's `on_display_changed`).
    pub display_changed: mpsc::UnboundedReceiver<DisplayId>,
    /// Fires whenever the foreground window changes, even if it's on the
    /// same display - `ScreenSource` drains this to trigger an
    /// off-schedule capture instead of waiting for the next poll tick.
    pub window_changed: mpsc::UnboundedReceiver<()>,
}

/// Publishes the id of the display holding focus. Cheap to read from
/// multiple tasks (`current_display` is a relaxed atomic load); the
/// background poll loop is the only writer.
pub struct ActiveDisplayTracker {
    current: Arc<AtomicI64>,
    permission_denied_fired: Arc<std::sync::atomic::AtomicBool>,
    _display_tx: mpsc::UnboundedSender<DisplayId>,
    _window_tx: mpsc::UnboundedSender<()>,
}

impl ActiveDisplayTracker {
    /// Spawns the background poll loop and returns the tracker handle plus
    /// the receiving side of the channels the poll loop publishes to -
    /// `ScreenSource` drains them to stay in step without calling back
    /// into the tracker.
    pub fn start(poll_interval: std::time::Duration) -> (Self, DisplayTrackerEvents) {
        let (display_tx, display_rx) = mpsc::unbounded_channel();
        let (window_tx, window_rx) = mpsc::unbounded_channel();
        let current = Arc::new(AtomicI64::new(0));
        let permission_denied_fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let last_hwnd = Arc::new(AtomicIsize::new(0));

        let current_writer = current.clone();
        let denied_writer = permission_denied_fired.clone();
        let last_hwnd_writer = last_hwnd.clone();
        let display_tx_writer = display_tx.clone();
        let window_tx_writer = window_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                interval.tick().await;
                match focused_window() {
                    Ok((hwnd, display_id)) => {
                        denied_writer.store(false, Ordering::Relaxed);
                        if last_hwnd_writer.swap(hwnd, Ordering::Relaxed) != hwnd {
                            let _ = window_tx_writer.send(());
                        }
                        if current_writer.swap(display_id.0, Ordering::Relaxed) != display_id.0 {
                            let _ = display_tx_writer.send(display_id);
                        }
                    }
                    Err(DisplayTrackerError::PermissionDenied) => {
                        if !denied_writer.swap(true, Ordering::Relaxed) {
                            tracing::warn!(
                                "accessibility permission denied; falling back to main display"
                            );
                        }
                        current_writer.store(0, Ordering::Relaxed);
                        let _ = display_tx_writer.send(DisplayId(0));
                    }
                    Err(e) => {
                        tracing::debug!("focused display lookup failed: {}", e);
                    }
                }
            }
        });

        (
            Self {
                current,
                permission_denied_fired,
                _display_tx: display_tx,
                _window_tx: window_tx,
            },
            DisplayTrackerEvents {
                display_changed: display_rx,
                window_changed: window_rx,
            },
        )
    }

    /// The last-known focused display. Cached; never blocks.
    pub fn current_display(&self) -> DisplayId {
        DisplayId(self.current.load(Ordering::Relaxed))
    }

    pub fn permission_was_denied(&self) -> bool {
        self.permission_denied_fired.load(Ordering::Relaxed)
    }
}

/// Resolves the foreground window handle and the display under it.
/// Enumerating monitors on every poll tick (rather than caching) keeps
/// this correct across monitor hot-plug, at the cost of an
/// `EnumDisplayMonitors` call every tick - cheap relative to the poll
/// interval. No foreground window (e.g. a locked session) reports as
/// handle `0` on the main display rather than erroring.
fn focused_window() -> std::result::Result<(isize, DisplayId), DisplayTrackerError> {
    unsafe {
        let hwnd = GetForegroundWindow();
        if hwnd.0 == 0 {
            return Ok((0, DisplayId(0)));
        }
        let hmonitor = MonitorFromWindow(hwnd, MONITOR_DEFAULTTOPRIMARY);
        let monitors = enumerate_monitor_handles()
            .map_err(|e| DisplayTrackerError::WindowsApiError(e))?;
        let index = monitors
            .iter()
            .position(|&h| h.0 == hmonitor.0)
            .unwrap_or(0);
        Ok((hwnd.0, DisplayId(index as i64)))
    }
}

unsafe fn enumerate_monitor_handles() -> std::result::Result<Vec<HMONITOR>, String> {
    let handles: std::sync::Mutex<Vec<HMONITOR>> = std::sync::Mutex::new(Vec::new());
    let handles_ptr = &handles as *const std::sync::Mutex<Vec<HMONITOR>> as isize;

    EnumDisplayMonitors(
        HDC::default(),
        None,
        Some(enum_monitor_handles_callback),
        LPARAM(handles_ptr),
    );

    handles
        .into_inner()
        .map_err(|e| format!("failed to collect monitor handles: {}", e))
}

unsafe extern "system" fn enum_monitor_handles_callback(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _lprect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let handles_ptr = lparam.0 as *const std::sync::Mutex<Vec<HMONITOR>>;
    let handles = &*handles_ptr;

    let mut info = MONITORINFOEXW {
        monitorInfo: windows::Win32::Graphics::Gdi::MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFOEXW>() as u32,
            ..Default::default()
        },
        ..Default::default()
    };
    if GetMonitorInfoW(hmonitor, &mut info.monitorInfo as *mut _ as *mut _).as_bool() {
        if let Ok(mut guard) = handles.lock() {
            guard.push(hmonitor);
        }
    }
    BOOL::from(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn starts_with_the_main_display_cached() {
        let (tracker, _events) = ActiveDisplayTracker::start(std::time::Duration::from_secs(3600));
        assert_eq!(tracker.current_display(), DisplayId(0));
        assert!(!tracker.permission_was_denied());
    }
}
