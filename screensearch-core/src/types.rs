//! Types shared across capture, OCR, and ingest components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a physical display. Stable for the lifetime of the OS's own
/// enumeration order; not guaranteed stable across reboots or monitor
/// hot-plug events, which is why `frames.display_id` is an opaque integer
/// rather than a foreign key into a `displays` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayId(pub i64);

impl std::fmt::Display for DisplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "display-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 4 bytes per pixel, little-endian B,G,R,A - what `screenshots` and
    /// the Windows GDI capture path both hand back natively.
    Bgra8,
}

/// An owned, decoded pixel buffer. Every component that touches raw pixels
/// (capture, dedup, segment encode, OCR) takes this instead of a
/// platform-specific bitmap handle, so none of them leak GDI/COM lifetimes
/// across an await point.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        let bytes_per_row = width * bytes_per_pixel(format);
        Self {
            width,
            height,
            bytes_per_row,
            format,
            data,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// A rectangular sub-view, copied out as its own buffer. Used by
    /// `TextExtractor`'s tile cache to hand OCR a single tile without
    /// re-capturing the frame.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> PixelBuffer {
        let bpp = bytes_per_pixel(self.format) as usize;
        let mut out = Vec::with_capacity((width as usize) * (height as usize) * bpp);
        for row in y..(y + height).min(self.height) {
            let row_start = row as usize * self.bytes_per_row as usize + x as usize * bpp;
            let row_end = row_start + (width.min(self.width - x) as usize) * bpp;
            if row_end <= self.data.len() {
                out.extend_from_slice(&self.data[row_start..row_end]);
            }
        }
        PixelBuffer::new(width, height, self.format, out)
    }

    /// Paint a rectangle solid black in place, used to redact excluded
    /// windows before the frame ever reaches the segment encoder or OCR.
    pub fn blackout(&mut self, x: u32, y: u32, width: u32, height: u32) {
        let bpp = bytes_per_pixel(self.format) as usize;
        let x_end = (x + width).min(self.width);
        let y_end = (y + height).min(self.height);
        for row in y..y_end {
            let row_start = row as usize * self.bytes_per_row as usize + x as usize * bpp;
            let row_end = row_start + (x_end - x) as usize * bpp;
            if row_end <= self.data.len() {
                self.data[row_start..row_end].fill(0);
            }
        }
    }
}

fn bytes_per_pixel(format: PixelFormat) -> u32 {
    match format {
        PixelFormat::Bgra8 => 4,
    }
}

/// A rectangle in screen coordinates, shared by window enumeration,
/// exclusion painting, and persisted region bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width as i32
            && other.x < self.x + self.width as i32
            && self.y < other.y + other.height as i32
            && other.y < self.y + self.height as i32
    }

    /// `self` with `other` cut out of it, as up to 4 non-overlapping
    /// rectangles covering whatever remains. Used to compute the part of an
    /// excluded window that is still visible once windows stacked in front
    /// of it are accounted for.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        if !self.intersects(other) {
            return vec![*self];
        }

        let (ax0, ay0, ax1, ay1) = (self.x, self.y, self.x + self.width as i32, self.y + self.height as i32);
        let (bx0, by0, bx1, by1) = (other.x, other.y, other.x + other.width as i32, other.y + other.height as i32);

        let mut out = Vec::with_capacity(4);

        if by0 > ay0 {
            out.push(Rect { x: ax0, y: ay0, width: (ax1 - ax0) as u32, height: (by0 - ay0) as u32 });
        }
        if by1 < ay1 {
            out.push(Rect { x: ax0, y: by1, width: (ax1 - ax0) as u32, height: (ay1 - by1) as u32 });
        }

        let my0 = ay0.max(by0);
        let my1 = ay1.min(by1);
        if my1 > my0 {
            if bx0 > ax0 {
                out.push(Rect { x: ax0, y: my0, width: (bx0 - ax0) as u32, height: (my1 - my0) as u32 });
            }
            if bx1 < ax1 {
                out.push(Rect { x: bx1, y: my0, width: (ax1 - bx1) as u32, height: (my1 - my0) as u32 });
            }
        }

        out
    }
}

/// A single on-screen window as enumerated by the OS, replacing the
/// "dynamic dictionary of anything" the original capture path passed
/// around internally. Every field here is always present; callers that
/// don't have a title or bundle id get `None`, not a missing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub bounds: Rect,
    pub owner_pid: u32,
    pub owner_bundle_id: Option<String>,
    pub owner_process_name: Option<String>,
    pub title: Option<String>,
    pub layer: i32,
    pub alpha: u8,
    pub is_on_screen: bool,
}

/// Metadata captured alongside a frame's pixels: which app/window was
/// frontmost, and (when extractable) the browser URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub app_bundle_id: Option<String>,
    pub app_name: Option<String>,
    pub window_title: Option<String>,
    pub browser_url: Option<String>,
}

/// One tick of capture output: pixels plus the context they were captured
/// under. `FrameIngestor` is the only consumer; it owns turning this into
/// catalog rows and queue entries.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub captured_at: DateTime<Utc>,
    pub display_id: DisplayId,
    pub pixels: PixelBuffer,
    pub metadata: FrameMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blackout_zeroes_only_the_requested_rect() {
        let mut buf = PixelBuffer::new(4, 4, PixelFormat::Bgra8, vec![0xFF; 4 * 4 * 4]);
        buf.blackout(1, 1, 2, 2);
        // top-left pixel untouched
        assert_eq!(&buf.data[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        // pixel at (1,1) zeroed
        let idx = (1 * buf.bytes_per_row + 1 * 4) as usize;
        assert_eq!(&buf.data[idx..idx + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn crop_extracts_the_requested_region() {
        let mut data = vec![0u8; 4 * 4 * 4];
        // Mark pixel (2,2) distinctly.
        let idx = (2 * 4 * 4 + 2 * 4) as usize;
        data[idx..idx + 4].copy_from_slice(&[1, 2, 3, 4]);
        let buf = PixelBuffer::new(4, 4, PixelFormat::Bgra8, data);
        let tile = buf.crop(2, 2, 2, 2);
        assert_eq!(&tile.data[0..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn rects_detect_overlap() {
        let a = Rect { x: 0, y: 0, width: 10, height: 10 };
        let b = Rect { x: 5, y: 5, width: 10, height: 10 };
        let c = Rect { x: 20, y: 20, width: 5, height: 5 };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn subtract_non_overlapping_returns_self_unchanged() {
        let a = Rect { x: 0, y: 0, width: 10, height: 10 };
        let b = Rect { x: 20, y: 20, width: 5, height: 5 };
        assert_eq!(a.subtract(&b), vec![a]);
    }

    #[test]
    fn subtract_full_cover_leaves_nothing() {
        let a = Rect { x: 0, y: 0, width: 10, height: 10 };
        let b = Rect { x: -5, y: -5, width: 30, height: 30 };
        assert!(a.subtract(&b).is_empty());
    }

    #[test]
    fn subtract_corner_overlap_leaves_an_l_shape() {
        let a = Rect { x: 0, y: 0, width: 10, height: 10 };
        let b = Rect { x: 5, y: 5, width: 10, height: 10 };
        let remainder = a.subtract(&b);
        // top strip (y 0..5) plus left strip of the bottom half (x 0..5, y 5..10)
        assert_eq!(remainder.len(), 2);
        let area: u32 = remainder.iter().map(|r| r.width * r.height).sum();
        assert_eq!(area, 100 - 25); // 10x10 minus the 5x5 overlap
    }

    #[test]
    fn subtract_center_hole_yields_four_strips() {
        let a = Rect { x: 0, y: 0, width: 10, height: 10 };
        let hole = Rect { x: 3, y: 3, width: 4, height: 4 };
        let remainder = a.subtract(&hole);
        assert_eq!(remainder.len(), 4);
        let area: u32 = remainder.iter().map(|r| r.width * r.height).sum();
        assert_eq!(area, 100 - 16);
    }
}
