//! Windows OCR engine binding.
//!
//! Implements a `TextRecognizer` trait that `TextExtractor` drives
//! per-tile, via a PNG-round-trip-through-`spawn_blocking`: Windows OCR's
//! COM types aren't `Send`, so the actual `RecognizeAsync` call has to run
//! on a blocking thread that owns the engine for its whole lifetime.

use crate::{OcrError, Result};
use async_trait::async_trait;
use screensearch_core::types::PixelBuffer;
use windows::core::ComInterface;
use windows::Graphics::Imaging::BitmapDecoder;
use windows::Media::Ocr::OcrEngine as WinOcrEngine;
use windows::Storage::Streams::{DataWriter, IRandomAccessStream, InMemoryRandomAccessStream};

/// A single recognized line, in the coordinate space of whatever buffer was
/// handed to the recognizer (a tile, when called through `TextExtractor`).
#[derive(Debug, Clone)]
pub struct RawTextRegion {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// Engine-agnostic text recognition over a decoded pixel buffer. Exists so
/// `TextExtractor` doesn't hard-depend on Windows OCR directly; tests swap
/// in a fake that returns canned regions.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, tile: &PixelBuffer) -> Result<Vec<RawTextRegion>>;
}

/// Wraps a single `Windows::Media::Ocr::OcrEngine` instance. The instance
/// itself never crosses an await point; every call dispatches onto a
/// dedicated blocking task via `spawn_blocking`.
pub struct WindowsOcrRecognizer {
    engine: WinOcrEngine,
}

impl WindowsOcrRecognizer {
    /// Builds an engine from the user's profile languages.
    pub fn new() -> Result<Self> {
        let engine = WinOcrEngine::TryCreateFromUserProfileLanguages()
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        Ok(Self { engine })
    }

    pub fn new_with_language(tag: &str) -> Result<Self> {
        let language = windows::Globalization::Language::CreateLanguage(&tag.into())
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        let engine = WinOcrEngine::TryCreateFromLanguage(&language)
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        Ok(Self { engine })
    }
}

#[async_trait]
impl TextRecognizer for WindowsOcrRecognizer {
    async fn recognize(&self, tile: &PixelBuffer) -> Result<Vec<RawTextRegion>> {
        let png_bytes = encode_png(tile)?;
        let engine = self.engine.clone();

        tokio::task::spawn_blocking(move || recognize_sync(&engine, &png_bytes))
            .await
            .map_err(|e| OcrError::EngineError(format!("recognizer task panicked: {}", e)))?
    }
}

fn encode_png(tile: &PixelBuffer) -> Result<Vec<u8>> {
    // `PixelBuffer` is BGRA8; `image` wants RGBA8 for its PNG encoder.
    let mut rgba = Vec::with_capacity(tile.data.len());
    for px in tile.data.chunks_exact(4) {
        rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
    }
    let img = image::RgbaImage::from_raw(tile.width, tile.height, rgba)
        .ok_or_else(|| OcrError::EncodeError("tile dimensions don't match pixel count".into()))?;

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageOutputFormat::Png)
        .map_err(|e| OcrError::EncodeError(e.to_string()))?;
    Ok(buffer)
}

/// Runs entirely on the blocking thread the engine was handed to: every
/// Windows OCR COM call here is synchronous-under-the-hood (`.get()` blocks
/// on the underlying `IAsyncOperation`).
fn recognize_sync(engine: &WinOcrEngine, png_bytes: &[u8]) -> Result<Vec<RawTextRegion>> {
    let stream = InMemoryRandomAccessStream::new()
        .map_err(|e| OcrError::EngineError(e.to_string()))?;
    let writer = DataWriter::CreateDataWriter(&stream)
        .map_err(|e| OcrError::EngineError(e.to_string()))?;
    writer
        .WriteBytes(png_bytes)
        .map_err(|e| OcrError::EngineError(e.to_string()))?;
    writer
        .StoreAsync()
        .and_then(|op| op.get())
        .map_err(|e| OcrError::EngineError(e.to_string()))?;
    stream
        .Seek(0)
        .map_err(|e| OcrError::EngineError(e.to_string()))?;

    let decoder = BitmapDecoder::CreateAsync(&stream)
        .and_then(|op| op.get())
        .map_err(|e| OcrError::EngineError(e.to_string()))?;
    let bitmap = decoder
        .GetSoftwareBitmapAsync()
        .and_then(|op| op.get())
        .map_err(|e| OcrError::EngineError(e.to_string()))?;

    let result = engine
        .RecognizeAsync(&bitmap)
        .and_then(|op| op.get())
        .map_err(|e| OcrError::EngineError(e.to_string()))?;

    let mut regions = Vec::new();
    for line in result
        .Lines()
        .map_err(|e| OcrError::EngineError(e.to_string()))?
    {
        let text = line
            .Text()
            .map_err(|e| OcrError::EngineError(e.to_string()))?
            .to_string();
        if text.trim().is_empty() {
            continue;
        }

        let words = line
            .Words()
            .map_err(|e| OcrError::EngineError(e.to_string()))?;
        let mut bounds: Option<(i32, i32, i32, i32)> = None;
        for word in &words {
            let rect = word
                .BoundingRect()
                .map_err(|e| OcrError::EngineError(e.to_string()))?;
            let (x0, y0, x1, y1) = (
                rect.X as i32,
                rect.Y as i32,
                (rect.X + rect.Width) as i32,
                (rect.Y + rect.Height) as i32,
            );
            bounds = Some(match bounds {
                None => (x0, y0, x1, y1),
                Some((bx0, by0, bx1, by1)) => (bx0.min(x0), by0.min(y0), bx1.max(x1), by1.max(y1)),
            });
        }

        let (x, y, width, height) = match bounds {
            Some((x0, y0, x1, y1)) => (x0, y0, (x1 - x0).max(0) as u32, (y1 - y0).max(0) as u32),
            None => (0, 0, 0, 0),
        };

        regions.push(RawTextRegion {
            text,
            x,
            y,
            width,
            height,
            // Windows OCR doesn't surface a confidence score per line.
            confidence: 1.0,
        });
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_png_rejects_mismatched_buffers() {
        let bogus = PixelBuffer::new(
            4,
            4,
            screensearch_core::types::PixelFormat::Bgra8,
            vec![0u8; 4], // far too short for 4x4 bgra8
        );
        assert!(encode_png(&bogus).is_err());
    }

    #[test]
    fn encode_png_succeeds_on_a_well_formed_tile() {
        let tile = PixelBuffer::new(
            2,
            2,
            screensearch_core::types::PixelFormat::Bgra8,
            vec![0xFFu8; 2 * 2 * 4],
        );
        assert!(encode_png(&tile).is_ok());
    }
}
