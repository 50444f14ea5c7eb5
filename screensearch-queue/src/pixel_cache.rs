//! In-memory per-frame pixel cache.
//!
//! `FrameIngestor` hands a freshly captured frame's pixels straight to the
//! queue when it enqueues OCR work, so a worker that picks the frame up
//! before the segment's next fragment flush doesn't have to read a
//! still-being-written video tail. Entries are removed on first use by a
//! worker - the cache is not a second copy of the record, just a
//! shortcut past one `SegmentStore::read_frame` call.

use dashmap::DashMap;
use screensearch_core::PixelBuffer;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct PixelCache {
    entries: Arc<DashMap<i64, PixelBuffer>>,
}

impl PixelCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, frame_id: i64, pixels: PixelBuffer) {
        self.entries.insert(frame_id, pixels);
    }

    /// Removes and returns the cached buffer for `frame_id`, if any. A
    /// worker that takes a buffer here never has to fall back to
    /// `SegmentStore::read_frame` for this frame again; a miss here is
    /// the normal case for a frame that waited in the queue long enough
    /// for the cache to have nothing to offer (process restart, retry
    /// after a prior worker already consumed the entry).
    pub fn take(&self, frame_id: i64) -> Option<PixelBuffer> {
        self.entries.remove(&frame_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screensearch_core::PixelFormat;

    fn buf() -> PixelBuffer {
        PixelBuffer::new(2, 2, PixelFormat::Bgra8, vec![0u8; 16])
    }

    #[test]
    fn take_removes_the_entry() {
        let cache = PixelCache::new();
        cache.insert(1, buf());
        assert!(cache.take(1).is_some());
        assert!(cache.take(1).is_none());
    }

    #[test]
    fn take_on_missing_frame_is_none() {
        let cache = PixelCache::new();
        assert!(cache.take(42).is_none());
    }
}
