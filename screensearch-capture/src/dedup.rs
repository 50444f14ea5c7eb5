//! Frame deduplication via color-histogram similarity.
//!
//! A middle ground between a cheap pixel-equality check (misses a frame
//! that shifted a few pixels but is otherwise identical) and an expensive
//! SSIM window scan. Operates directly on `PixelBuffer`.

use screensearch_core::types::PixelBuffer;

/// Compares successive frames and decides which ones are similar enough
/// to skip. Stateful: remembers the last frame it was asked to compare
/// against.
pub struct Deduplicator {
    threshold: f32,
    last_frame: Option<PixelBuffer>,
}

impl Deduplicator {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            last_frame: None,
        }
    }

    /// Returns true if `current` differs enough from the last frame seen
    /// to warrant processing. Always true for the first frame. Updates
    /// internal state to `current` when it returns true - an unchanged
    /// frame is never retained in place of the original reference, so a
    /// slow drift does not accumulate unnoticed.
    ///
    /// `threshold` is a similarity threshold, not a distance: a score
    /// `>= threshold` means "same" (spec's dedup contract), so a frame
    /// counts as changed only when similarity falls *below* `threshold`.
    pub fn has_changed(&mut self, current: &PixelBuffer) -> bool {
        let changed = match &self.last_frame {
            None => true,
            Some(last) => similarity(last, current) < self.threshold,
        };

        if changed {
            self.last_frame = Some(current.clone());
        }

        changed
    }

    pub fn reset(&mut self) {
        self.last_frame = None;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Histogram similarity between two buffers, 0.0 (completely different) to
/// 1.0 (identical). Dimension mismatch is always 0.0; identical buffers
/// are always 1.0; the function is symmetric and deterministic so the
/// same pair of frames always yields the same verdict regardless of
/// argument order.
pub fn similarity(a: &PixelBuffer, b: &PixelBuffer) -> f32 {
    if a.dimensions() != b.dimensions() {
        return 0.0;
    }
    if a.data == b.data {
        return 1.0;
    }

    const BINS: usize = 16;
    let mut hist_a = [0u32; BINS * 3];
    let mut hist_b = [0u32; BINS * 3];

    bucket_histogram(a, &mut hist_a);
    bucket_histogram(b, &mut hist_b);

    let mut chi_squared = 0.0f32;
    for i in 0..hist_a.len() {
        let h1 = hist_a[i] as f32;
        let h2 = hist_b[i] as f32;
        if h1 + h2 > 0.0 {
            chi_squared += ((h1 - h2) * (h1 - h2)) / (h1 + h2);
        }
    }

    let total_pixels = (a.width * a.height) as f32;
    let distance = (chi_squared / total_pixels).min(1.0);
    1.0 - distance
}

fn bucket_histogram(buf: &PixelBuffer, hist: &mut [u32; 48]) {
    const BINS: usize = 16;
    for row in 0..buf.height as usize {
        let start = row * buf.bytes_per_row as usize;
        let row_bytes = &buf.data[start..start + (buf.width as usize * 4)];
        for px in row_bytes.chunks_exact(4) {
            // BGRA8 byte order
            let b = (px[0] as usize * BINS) / 256;
            let g = (px[1] as usize * BINS) / 256;
            let r = (px[2] as usize * BINS) / 256;
            hist[r] += 1;
            hist[BINS + g] += 1;
            hist[BINS * 2 + b] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screensearch_core::types::PixelFormat;

    fn solid_buffer(width: u32, height: u32, color: [u8; 4]) -> PixelBuffer {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        PixelBuffer::new(width, height, PixelFormat::Bgra8, data)
    }

    #[test]
    fn identical_buffers_are_fully_similar() {
        let a = solid_buffer(32, 32, [10, 20, 30, 255]);
        let b = a.clone();
        assert_eq!(similarity(&a, &b), 1.0);
    }

    #[test]
    fn dimension_mismatch_is_zero_similarity() {
        let a = solid_buffer(32, 32, [10, 20, 30, 255]);
        let b = solid_buffer(16, 16, [10, 20, 30, 255]);
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = solid_buffer(32, 32, [10, 20, 30, 255]);
        let b = solid_buffer(32, 32, [200, 100, 50, 255]);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn first_frame_always_changed() {
        let mut dedup = Deduplicator::new(0.05);
        let frame = solid_buffer(8, 8, [1, 2, 3, 255]);
        assert!(dedup.has_changed(&frame));
    }

    #[test]
    fn identical_second_frame_is_not_changed() {
        let mut dedup = Deduplicator::new(0.05);
        let frame = solid_buffer(8, 8, [1, 2, 3, 255]);
        assert!(dedup.has_changed(&frame));
        assert!(!dedup.has_changed(&frame));
    }

    #[test]
    fn very_different_second_frame_is_changed() {
        let mut dedup = Deduplicator::new(0.05);
        let frame1 = solid_buffer(8, 8, [0, 0, 0, 255]);
        let frame2 = solid_buffer(8, 8, [255, 255, 255, 255]);
        assert!(dedup.has_changed(&frame1));
        assert!(dedup.has_changed(&frame2));
    }

    /// A quarter of the pixels move to a distinct (not inverted) color,
    /// which works out to similarity 1/7 (~0.143) under the histogram
    /// metric - nowhere near 0.0 or 1.0. At a realistic `dedup_threshold`
    /// of 0.98 (spec.md's own dedup scenario threshold), this must count
    /// as changed. The buggy `1.0 - threshold` cutoff this regresses
    /// against would compare 0.143 against 0.02 and wrongly call it a
    /// duplicate.
    #[test]
    fn moderately_different_frame_is_changed_at_a_realistic_threshold() {
        let mut dedup = Deduplicator::new(0.98);
        let color_a = [10, 20, 30, 255];
        let color_b = [200, 150, 100, 255];

        let frame1 = solid_buffer(16, 16, color_a);
        let mut frame2 = frame1.clone();
        for row in 0..4 {
            let start = row * frame2.bytes_per_row as usize;
            let row_bytes = &mut frame2.data[start..start + 16 * 4];
            for px in row_bytes.chunks_exact_mut(4) {
                px.copy_from_slice(&color_b);
            }
        }

        assert!(dedup.has_changed(&frame1));
        assert!(dedup.has_changed(&frame2));
    }
}
