//! Shared types and time/id primitives used across the ScreenSearch workspace.
//!
//! Every other crate in the workspace depends on this one for the types that
//! cross component boundaries (`CapturedFrame`, `WindowInfo`, ...) so that
//! `screensearch-capture`, `screensearch-ocr`, and `screensearch-queue` never
//! have to depend on each other directly.

pub mod clock;
pub mod ids;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use ids::IdAllocator;
pub use types::{CapturedFrame, DisplayId, FrameMetadata, PixelBuffer, PixelFormat, WindowInfo};
