//! Frame ingestion and retention: the two background loops that turn a
//! `ScreenSource` tick stream into catalog rows (`FrameIngestor`) and
//! later evict them again (`RetentionEnforcer`).

pub mod config;
pub mod error;
pub mod ingestor;
pub mod retention;

pub use config::{IngestConfig, RetentionConfig};
pub use error::{IngestError, Result};
pub use ingestor::{FrameIngestor, IngestOutcome};
pub use retention::{RetentionEnforcer, RetentionReport};
