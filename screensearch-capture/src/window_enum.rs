//! On-screen window enumeration.
//!
//! A full top-to-bottom z-order walk, since exclusion painting needs
//! every visible window's bounds, not just the focused one.

use crate::Result;
use screensearch_core::types::{Rect, WindowInfo};
use windows::Win32::Foundation::{HWND, MAX_PATH, RECT};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, GetLayeredWindowAttributes, GetWindow, GetWindowLongW, GetWindowRect,
    GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible, GWL_EXSTYLE, GW_HWNDNEXT,
    WS_EX_LAYERED,
};

/// Enumerates every visible top-level window, ordered front-to-back
/// (the order `ActiveDisplayTracker` and exclusion painting both rely on:
/// the first match wins when two windows overlap the same screen pixel).
pub fn enumerate_windows() -> Result<Vec<WindowInfo>> {
    let mut windows = Vec::new();
    unsafe {
        let mut hwnd = GetForegroundWindow();
        if hwnd.0 == 0 {
            hwnd = GetWindow(HWND::default(), GW_HWNDNEXT).unwrap_or_default();
        }

        let mut current = hwnd;
        let mut guard = 0;
        while current.0 != 0 && guard < 4096 {
            guard += 1;
            if IsWindowVisible(current).as_bool() {
                if let Some(info) = describe_window(current) {
                    windows.push(info);
                }
            }
            current = GetWindow(current, GW_HWNDNEXT).unwrap_or_default();
        }
    }
    Ok(windows)
}

unsafe fn describe_window(hwnd: HWND) -> Option<WindowInfo> {
    let mut rect = RECT::default();
    if GetWindowRect(hwnd, &mut rect).is_err() {
        return None;
    }
    if rect.right <= rect.left || rect.bottom <= rect.top {
        return None;
    }

    let title = window_title(hwnd);
    let (owner_pid, owner_process_name) = process_info(hwnd).unwrap_or((0, None));
    let alpha = layered_alpha(hwnd);

    Some(WindowInfo {
        bounds: Rect {
            x: rect.left,
            y: rect.top,
            width: (rect.right - rect.left) as u32,
            height: (rect.bottom - rect.top) as u32,
        },
        owner_pid,
        owner_bundle_id: owner_process_name.clone(),
        owner_process_name,
        title,
        layer: 0,
        alpha,
        is_on_screen: true,
    })
}

/// Per-window alpha, read from `GetLayeredWindowAttributes` for windows
/// with `WS_EX_LAYERED`; fully opaque (255) for everything else, since an
/// unlayered window has no meaningful per-window alpha.
unsafe fn layered_alpha(hwnd: HWND) -> u8 {
    let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
    if ex_style & WS_EX_LAYERED.0 == 0 {
        return 255;
    }
    let mut alpha = 255u8;
    let mut color_key = Default::default();
    let mut flags = Default::default();
    if GetLayeredWindowAttributes(hwnd, Some(&mut color_key), Some(&mut alpha), Some(&mut flags))
        .is_err()
    {
        return 255;
    }
    alpha
}

unsafe fn window_title(hwnd: HWND) -> Option<String> {
    let mut buf: [u16; 512] = [0; 512];
    let len = GetWindowTextW(hwnd, &mut buf);
    if len > 0 {
        Some(String::from_utf16_lossy(&buf[..len as usize]))
    } else {
        None
    }
}

unsafe fn process_info(hwnd: HWND) -> Option<(u32, Option<String>)> {
    let mut process_id: u32 = 0;
    GetWindowThreadProcessId(hwnd, Some(&mut process_id));
    if process_id == 0 {
        return None;
    }

    let process_handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
    let mut buffer = vec![0u16; MAX_PATH as usize];
    let mut size = buffer.len() as u32;
    QueryFullProcessImageNameW(
        process_handle,
        PROCESS_NAME_WIN32,
        windows::core::PWSTR(buffer.as_mut_ptr()),
        &mut size,
    )
    .ok()?;

    let path = String::from_utf16_lossy(&buffer[..size as usize]);
    let name = std::path::Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string());

    Some((process_id, name))
}

