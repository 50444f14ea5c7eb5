//! Tile-cached, chrome/content-aware text extraction.
//!
//! `TextExtractor` runs a fixed tile grid through `FullFrameCache`, splits
//! chrome text from content text by a fixed top/bottom band, merges in
//! accessibility text by similarity rather than blindly concatenating it,
//! and pulls a URL from the chrome band alone. Calls are serialized per
//! instance via an internal `tokio::sync::Mutex`, since a single Windows
//! OCR engine instance isn't meant to be driven concurrently.

use crate::accessibility::AccessibilityProvider;
use crate::recognizer::{RawTextRegion, TextRecognizer};
use crate::tile_cache::FullFrameCache;
use crate::url_extract::extract_url;
use crate::Result;
use screensearch_core::types::PixelBuffer;
use screensearch_db::{DatabaseManager, NewRegion};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Fraction of frame height treated as browser/app chrome at the top and
/// bottom edges. Text inside either band is "chrome text"; everything else
/// is "content text". A fixed band rather than trying to detect actual
/// window decorations.
const CHROME_BAND_FRACTION: f32 = 0.05;

/// Text regions whose normalized-by-length edit distance looks similar
/// enough to be "the same sentence" are merged rather than duplicated when
/// combining OCR output with accessibility text.
const MERGE_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Tile grid as (columns, rows). 4x4 balances cache granularity against
    /// per-tile OCR call overhead for a typical 1080p-ish frame.
    pub tile_grid: (u32, u32),
    pub use_accessibility: bool,
    pub extract_urls: bool,
    /// Regions recognized below this confidence are dropped before merge.
    /// `WindowsOcrRecognizer` doesn't expose a real per-line score and
    /// reports 1.0 for everything, so this only bites with recognizers
    /// that do.
    pub min_confidence: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            tile_grid: (4, 4),
            use_accessibility: true,
            extract_urls: true,
            min_confidence: 0.0,
        }
    }
}

/// The merged result of one frame's extraction, ready for
/// `Catalog::write_extracted_text`.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub full_text: String,
    pub chrome_text: String,
    pub regions: Vec<NewRegion>,
    pub browser_url: Option<String>,
}

pub struct TextExtractor {
    config: ExtractorConfig,
    recognizer: Arc<dyn TextRecognizer>,
    accessibility: Arc<dyn AccessibilityProvider>,
    cache: Mutex<FullFrameCache>,
}

impl TextExtractor {
    pub fn new(
        config: ExtractorConfig,
        recognizer: Arc<dyn TextRecognizer>,
        accessibility: Arc<dyn AccessibilityProvider>,
    ) -> Self {
        Self {
            config,
            recognizer,
            accessibility,
            cache: Mutex::new(FullFrameCache::new()),
        }
    }

    /// Runs OCR over `pixels`' tile grid, merges in accessibility text when
    /// enabled, and writes the result straight through to the catalog.
    /// Locking the cache mutex for the whole call serializes extraction per
    /// instance - concurrent frames queue rather than racing the same
    /// Windows OCR engine instance.
    pub async fn extract_and_store(
        &self,
        db: &DatabaseManager,
        frame_id: i64,
        segment_id: i64,
        pixels: &PixelBuffer,
    ) -> Result<ExtractedText> {
        let extracted = self.extract(pixels).await?;
        db.write_extracted_text(
            frame_id,
            segment_id,
            &extracted.full_text,
            &extracted.chrome_text,
            &extracted.regions,
            extracted.browser_url.as_deref(),
        )
        .await?;
        Ok(extracted)
    }

    pub async fn extract(&self, pixels: &PixelBuffer) -> Result<ExtractedText> {
        let mut cache = self.cache.lock().await;
        let (cols, rows) = self.config.tile_grid;
        let (width, height) = pixels.dimensions();
        let resolution = (width, height);
        let tile_width = (width / cols).max(1);
        let tile_height = (height / rows).max(1);
        let chrome_band = (height as f32 * CHROME_BAND_FRACTION) as u32;

        let mut ocr_regions: Vec<(RawTextRegion, bool)> = Vec::new();

        for row in 0..rows {
            for col in 0..cols {
                let x = col * tile_width;
                let y = row * tile_height;
                let w = if col + 1 == cols { width - x } else { tile_width };
                let h = if row + 1 == rows { height - y } else { tile_height };
                if w == 0 || h == 0 {
                    continue;
                }

                let tile = pixels.crop(x, y, w, h);
                let regions = match cache.lookup(resolution, (col, row), &tile) {
                    Some(cached) => cached,
                    None => {
                        let recognized = self.recognizer.recognize(&tile).await?;
                        cache.store((col, row), &tile, recognized.clone());
                        recognized
                    }
                };

                for mut region in regions {
                    if region.confidence < self.config.min_confidence {
                        continue;
                    }
                    region.x += x as i32;
                    region.y += y as i32;
                    let is_chrome = is_chrome_region(&region, height, chrome_band);
                    ocr_regions.push((region, is_chrome));
                }
            }
        }
        drop(cache);

        let accessibility_text = if self.config.use_accessibility {
            self.accessibility.focused_window_text().await.unwrap_or_default()
        } else {
            Vec::new()
        };

        let merged = merge_accessibility(ocr_regions, accessibility_text);
        build_extracted_text(merged, self.config.extract_urls)
    }
}

fn is_chrome_region(region: &RawTextRegion, frame_height: u32, band: u32) -> bool {
    let top_edge = band;
    let bottom_edge = frame_height.saturating_sub(band);
    let region_bottom = region.y as u32 + region.height;
    region.y as u32 <= top_edge || region_bottom >= bottom_edge
}

struct MergedRegion {
    text: String,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    is_chrome: bool,
}

/// Chrome regions pass through untouched - accessibility text describes
/// the focused *application's* content, not menu/dock chrome. Content
/// regions are merged against the accessibility snippets as one
/// whole-text decision, per spec: join the OCR content regions into one
/// string, join the accessibility snippets into another, and compare
/// them with word-set Jaccard similarity.
///
/// If the two are similar enough, the accessibility tree is assumed more
/// accurate than OCR for this frame and replaces the OCR content regions
/// entirely (as a single region with no pixel position - accessibility
/// text carries no bounding box). Otherwise the accessibility text is
/// prepended (also with no bounding box) and the OCR content regions are
/// kept for their bounding boxes.
fn merge_accessibility(
    ocr_regions: Vec<(RawTextRegion, bool)>,
    accessibility_text: Vec<String>,
) -> Vec<MergedRegion> {
    let (chrome, content): (Vec<_>, Vec<_>) = ocr_regions.into_iter().partition(|(_, c)| *c);

    let mut merged: Vec<MergedRegion> = chrome
        .into_iter()
        .map(|(r, _)| MergedRegion {
            text: r.text,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            is_chrome: true,
        })
        .collect();

    if accessibility_text.is_empty() {
        merged.extend(content.into_iter().map(|(r, _)| MergedRegion {
            text: r.text,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            is_chrome: false,
        }));
        return merged;
    }

    let ocr_content_text = content
        .iter()
        .map(|(r, _)| r.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let accessibility_joined = accessibility_text.join(" ");

    if jaccard_similarity(&ocr_content_text, &accessibility_joined) >= MERGE_SIMILARITY_THRESHOLD {
        merged.push(MergedRegion {
            text: accessibility_joined,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            is_chrome: false,
        });
    } else {
        merged.push(MergedRegion {
            text: accessibility_joined,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            is_chrome: false,
        });
        merged.extend(content.into_iter().map(|(r, _)| MergedRegion {
            text: r.text,
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
            is_chrome: false,
        }));
    }

    merged
}

/// Word-set Jaccard similarity, case-insensitive. Cheap and order-insensitive,
/// which matters because accessibility `Value`/`Name` text and OCR'd text for
/// the same on-screen string often differ in whitespace and punctuation but
/// share the same words.
fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<String> =
        a.to_lowercase().split_whitespace().map(String::from).collect();
    let set_b: std::collections::HashSet<String> =
        b.to_lowercase().split_whitespace().map(String::from).collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn build_extracted_text(regions: Vec<MergedRegion>, extract_urls: bool) -> Result<ExtractedText> {
    let mut full_text = String::new();
    let mut chrome_text = String::new();
    let mut new_regions = Vec::with_capacity(regions.len());

    for (window_index, region) in regions.iter().enumerate() {
        if region.text.is_empty() {
            continue;
        }

        if !full_text.is_empty() {
            full_text.push(' ');
        }
        let offset = full_text.len() as i64;
        full_text.push_str(&region.text);
        let length = region.text.len() as i64;

        if region.is_chrome {
            if !chrome_text.is_empty() {
                chrome_text.push(' ');
            }
            chrome_text.push_str(&region.text);
        }

        new_regions.push(NewRegion {
            text_offset: offset,
            text_length: length,
            x: region.x as i64,
            y: region.y as i64,
            width: region.width as i64,
            height: region.height as i64,
            chrome_bit: region.is_chrome,
            window_index: Some(window_index as i64),
        });
    }

    let browser_url = if extract_urls {
        extract_url(&chrome_text)
    } else {
        None
    };

    Ok(ExtractedText {
        full_text,
        chrome_text,
        regions: new_regions,
        browser_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use screensearch_core::types::PixelFormat;

    struct FakeRecognizer {
        regions: Vec<RawTextRegion>,
    }

    #[async_trait]
    impl TextRecognizer for FakeRecognizer {
        async fn recognize(&self, _tile: &PixelBuffer) -> Result<Vec<RawTextRegion>> {
            Ok(self.regions.clone())
        }
    }

    struct FakeAccessibility {
        text: Vec<String>,
    }

    #[async_trait]
    impl AccessibilityProvider for FakeAccessibility {
        async fn focused_window_text(&self) -> Result<Vec<String>> {
            Ok(self.text.clone())
        }
    }

    fn frame(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(
            width,
            height,
            PixelFormat::Bgra8,
            vec![0u8; width as usize * height as usize * 4],
        )
    }

    #[tokio::test]
    async fn chrome_text_only_includes_top_and_bottom_bands() {
        let region = RawTextRegion {
            text: "example.com/search - My Browser".to_string(),
            x: 0,
            y: 0,
            width: 100,
            height: 10,
            confidence: 1.0,
        };
        let recognizer = Arc::new(FakeRecognizer {
            regions: vec![region],
        });
        let accessibility = Arc::new(FakeAccessibility { text: vec![] });
        let extractor = TextExtractor::new(
            ExtractorConfig {
                tile_grid: (1, 1),
                ..Default::default()
            },
            recognizer,
            accessibility,
        );

        let result = extractor.extract(&frame(200, 200)).await.unwrap();
        assert!(result.chrome_text.contains("example.com"));
        assert_eq!(
            result.browser_url.as_deref(),
            Some("https://example.com/search")
        );
    }

    #[tokio::test]
    async fn similar_accessibility_text_replaces_ocr_content_regions() {
        let region = RawTextRegion {
            text: "Save File".to_string(),
            x: 50,
            y: 100,
            width: 40,
            height: 10,
            confidence: 1.0,
        };
        let recognizer = Arc::new(FakeRecognizer {
            regions: vec![region],
        });
        let accessibility = Arc::new(FakeAccessibility {
            text: vec!["Save File".to_string()],
        });
        let extractor = TextExtractor::new(
            ExtractorConfig {
                tile_grid: (1, 1),
                ..Default::default()
            },
            recognizer,
            accessibility,
        );

        let result = extractor.extract(&frame(200, 200)).await.unwrap();
        // Jaccard(ocr content, accessibility text) is 1.0, so the OCR
        // content region is dropped in favor of one accessibility-text
        // region with no bounding box.
        assert_eq!(result.regions.len(), 1);
        assert_eq!(result.regions[0].width, 0);
        assert_eq!(result.regions[0].height, 0);
    }

    #[tokio::test]
    async fn dissimilar_accessibility_text_is_prepended_and_keeps_ocr_bounds() {
        let region = RawTextRegion {
            text: "Totally unrelated OCR text".to_string(),
            x: 50,
            y: 100,
            width: 40,
            height: 10,
            confidence: 1.0,
        };
        let recognizer = Arc::new(FakeRecognizer {
            regions: vec![region],
        });
        let accessibility = Arc::new(FakeAccessibility {
            text: vec!["Completely different accessibility snippet".to_string()],
        });
        let extractor = TextExtractor::new(
            ExtractorConfig {
                tile_grid: (1, 1),
                ..Default::default()
            },
            recognizer,
            accessibility,
        );

        let result = extractor.extract(&frame(200, 200)).await.unwrap();
        // Low similarity: accessibility text is prepended (no bounding
        // box) and the OCR content region survives with its real bounds.
        assert_eq!(result.regions.len(), 2);
        assert_eq!(result.regions[0].width, 0);
        assert_eq!(result.regions[1].width, 40);
        assert_eq!(result.regions[1].x, 50);
        assert!(result.full_text.contains("Totally unrelated OCR text"));
        assert!(result.full_text.contains("Completely different accessibility snippet"));
    }

    #[tokio::test]
    async fn distinct_accessibility_snippet_is_appended() {
        let recognizer = Arc::new(FakeRecognizer { regions: vec![] });
        let accessibility = Arc::new(FakeAccessibility {
            text: vec!["Hidden menu item".to_string()],
        });
        let extractor = TextExtractor::new(
            ExtractorConfig {
                tile_grid: (1, 1),
                use_accessibility: true,
                extract_urls: false,
            },
            recognizer,
            accessibility,
        );

        let result = extractor.extract(&frame(200, 200)).await.unwrap();
        assert_eq!(result.regions.len(), 1);
        assert!(result.full_text.contains("Hidden menu item"));
    }

    #[test]
    fn jaccard_similarity_is_one_for_identical_word_sets() {
        assert_eq!(jaccard_similarity("hello world", "world hello"), 1.0);
    }

    #[test]
    fn jaccard_similarity_is_zero_for_disjoint_text() {
        assert_eq!(jaccard_similarity("alpha beta", "gamma delta"), 0.0);
    }
}
