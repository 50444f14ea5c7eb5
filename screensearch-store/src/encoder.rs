//! Thin wrapper around `windows_capture`'s Media Foundation encoder.
//!
//! Feeds already-decoded `PixelBuffer`s (from any `ScreenSource`) into an
//! H.264/MP4 writer one frame at a time, instead of writing one loose
//! image file per frame.

use screensearch_core::PixelBuffer;
use std::path::Path;
use windows_capture::encoder::{
    AudioSettingsBuilder, ContainerSettingsBuilder, VideoEncoder, VideoEncoderQuality,
    VideoEncoderType, VideoSettingsBuilder,
};

pub struct SegmentEncoder {
    inner: VideoEncoder,
    frame_index: u64,
}

impl SegmentEncoder {
    pub fn create(path: &Path, width: u32, height: u32) -> anyhow::Result<Self> {
        let video_settings = VideoSettingsBuilder::new(width, height)
            .encoder_type(VideoEncoderType::H264)
            .quality(VideoEncoderQuality::HD1080p)
            .fragmented(true);

        let inner = VideoEncoder::new(
            video_settings,
            AudioSettingsBuilder::default().disabled(true),
            ContainerSettingsBuilder::default(),
            path,
        )?;

        Ok(Self {
            inner,
            frame_index: 0,
        })
    }

    pub fn write_frame(&mut self, pixels: &PixelBuffer) -> anyhow::Result<()> {
        self.inner
            .send_frame_buffer(&pixels.data, pixels.width, pixels.height)?;
        self.frame_index += 1;
        Ok(())
    }

    pub fn flush_fragment(&mut self) -> anyhow::Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn finish(self) -> anyhow::Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

pub enum DecodeFailure {
    Torn,
    Other(String),
}

pub struct SegmentDecoder;

impl SegmentDecoder {
    /// Decodes a single frame from a segment file by index. A torn
    /// fragment (the segment was still open when this was called, and the
    /// writer hadn't flushed past `frame_index` yet) is reported distinctly
    /// from every other decode failure so callers can treat it as
    /// transient rather than unrecoverable.
    pub fn read_frame(path: &Path, frame_index: u32) -> Result<PixelBuffer, DecodeFailure> {
        let reader = windows_capture::encoder::VideoReader::open(path)
            .map_err(|e| DecodeFailure::Other(e.to_string()))?;

        match reader.decode_frame(frame_index) {
            Ok(frame) => Ok(PixelBuffer::new(
                frame.width,
                frame.height,
                screensearch_core::PixelFormat::Bgra8,
                frame.data,
            )),
            Err(e) if windows_capture::encoder::is_truncated_trailer_error(&e) => {
                Err(DecodeFailure::Torn)
            }
            Err(e) => Err(DecodeFailure::Other(e.to_string())),
        }
    }
}
