//! Time-bucketed, compressed video segment storage.
//!
//! A [`Segment`] is one H.264/MP4 file holding a contiguous run of frames
//! captured from a single display at a single resolution. Frames are never
//! written as loose image files; `SegmentStore` is the only thing on disk
//! outside the catalog database.

mod encoder;
mod path;

pub use path::segment_relative_path;

use chrono::{DateTime, Utc};
use screensearch_core::PixelBuffer;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("segment encoder failed: {0}")]
    Encode(String),

    #[error("segment decoder failed: {0}")]
    Decode(String),

    #[error("frame index {index} out of range for segment {segment_id} ({frame_count} frames)")]
    FrameOutOfRange {
        segment_id: i64,
        index: u32,
        frame_count: u32,
    },

    #[error("segment file missing: {0}")]
    FileMissing(PathBuf),

    #[error("segment file damaged: {0}")]
    Damaged(PathBuf),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Root-relative layout and file naming for segment files.
pub struct SegmentStore {
    root: PathBuf,
}

impl SegmentStore {
    /// Opens (creating if needed) a storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute_path(&self, opened_at: DateTime<Utc>, segment_id: i64) -> PathBuf {
        self.root.join(segment_relative_path(opened_at, segment_id))
    }

    /// Opens a new segment file for writing. The caller (`FrameIngestor`)
    /// is responsible for allocating `segment_id` via the catalog before
    /// calling this, so the file name and the catalog row agree.
    pub fn open_segment(
        &self,
        segment_id: i64,
        opened_at: DateTime<Utc>,
        width: u32,
        height: u32,
    ) -> Result<SegmentHandle> {
        let path = self.absolute_path(opened_at, segment_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let inner = encoder::SegmentEncoder::create(&path, width, height)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(SegmentHandle {
            segment_id,
            path,
            width,
            height,
            frame_count: 0,
            inner: Some(inner),
        })
    }

    /// Whether a segment's backing file exists on disk. Used by crash
    /// recovery and the failure-classification verification gate before an
    /// unrecoverable frame is deleted.
    pub fn segment_exists(&self, segment_id: i64, opened_at: DateTime<Utc>) -> bool {
        self.absolute_path(opened_at, segment_id).is_file()
    }

    /// Decodes and returns a single frame's pixels from a closed (or
    /// still-open but flushed) segment.
    pub fn read_frame(
        &self,
        segment_id: i64,
        opened_at: DateTime<Utc>,
        frame_index: u32,
        frame_count: u32,
    ) -> Result<PixelBuffer> {
        let path = self.absolute_path(opened_at, segment_id);
        if !path.is_file() {
            return Err(StoreError::FileMissing(path));
        }
        if frame_index >= frame_count {
            return Err(StoreError::FrameOutOfRange {
                segment_id,
                index: frame_index,
                frame_count,
            });
        }
        encoder::SegmentDecoder::read_frame(&path, frame_index).map_err(|e| match e {
            encoder::DecodeFailure::Torn => StoreError::Damaged(path.clone()),
            encoder::DecodeFailure::Other(msg) => StoreError::Decode(msg),
        })
    }

    /// Deletes a segment's backing file. Safe to call on an already-missing
    /// file (retention's orphan sweep may race a prior partial delete).
    pub fn delete_segment(&self, segment_id: i64, opened_at: DateTime<Utc>) -> Result<()> {
        let path = self.absolute_path(opened_at, segment_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(segment_id, path = %path.display(), "segment file deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

/// A segment open for writing. Each handle owns its own encoder and file
/// handle; no global registry is shared between handles, so closing one
/// segment can never truncate a sibling's file.
pub struct SegmentHandle {
    segment_id: i64,
    path: PathBuf,
    width: u32,
    height: u32,
    frame_count: u32,
    inner: Option<encoder::SegmentEncoder>,
}

impl SegmentHandle {
    pub fn segment_id(&self) -> i64 {
        self.segment_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Appends one frame, returning its 0-based index within the segment.
    pub fn append(&mut self, pixels: &PixelBuffer) -> Result<u32> {
        let encoder = self
            .inner
            .as_mut()
            .ok_or_else(|| StoreError::Encode("segment already finalized".into()))?;
        encoder
            .write_frame(pixels)
            .map_err(|e| StoreError::Encode(e.to_string()))?;
        let index = self.frame_count;
        self.frame_count += 1;
        Ok(index)
    }

    /// Flushes a fragment boundary so the segment's already-written frames
    /// are readable by a concurrent `read_frame` call even before
    /// `finalize` runs. Cheap to call frequently; the encoder is configured
    /// for fragmented MP4 output specifically so this is safe.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(encoder) = self.inner.as_mut() {
            encoder
                .flush_fragment()
                .map_err(|e| StoreError::Encode(e.to_string()))?;
        }
        Ok(())
    }

    /// Writes the MP4 trailer and releases the encoder. Idempotent: calling
    /// this twice is a no-op the second time.
    pub fn finalize(&mut self) -> Result<()> {
        if let Some(encoder) = self.inner.take() {
            encoder
                .finish()
                .map_err(|e| StoreError::Encode(e.to_string()))?;
            tracing::info!(
                segment_id = self.segment_id,
                frame_count = self.frame_count,
                path = %self.path.display(),
                "segment finalized"
            );
        }
        Ok(())
    }
}

impl Drop for SegmentHandle {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(e) = self.finalize() {
                tracing::error!(segment_id = self.segment_id, error = %e, "segment finalize on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screensearch_core::PixelFormat;

    fn sample_frame(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, PixelFormat::Bgra8, vec![128u8; (w * h * 4) as usize])
    }

    #[test]
    fn open_segment_creates_dated_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let opened_at = DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let handle = store.open_segment(42, opened_at, 1920, 1080).unwrap();
        assert!(handle.path().starts_with(dir.path().join("2026/03/01")));
    }

    #[test]
    fn append_increments_frame_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let opened_at = Utc::now();
        let mut handle = store.open_segment(1, opened_at, 64, 64).unwrap();
        let frame = sample_frame(64, 64);
        let i0 = handle.append(&frame).unwrap();
        let i1 = handle.append(&frame).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(handle.frame_count(), 2);
    }

    #[test]
    fn delete_segment_is_idempotent_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let opened_at = Utc::now();
        assert!(store.delete_segment(999, opened_at).is_ok());
    }

    #[test]
    fn read_frame_out_of_range_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        let opened_at = Utc::now();
        let mut handle = store.open_segment(7, opened_at, 32, 32).unwrap();
        handle.append(&sample_frame(32, 32)).unwrap();
        handle.finalize().unwrap();
        let err = store.read_frame(7, opened_at, 5, 1).unwrap_err();
        assert!(matches!(err, StoreError::FrameOutOfRange { .. }));
    }
}
