use chrono::{DateTime, Datelike, Utc};
use std::path::PathBuf;

/// `segments/YYYY/MM/DD/segment_<id>.mp4`, bucketed by the UTC date the
/// segment was opened. Bucketing by open date (not close date, which can
/// cross midnight for a long-running segment) keeps the directory a given
/// segment lives in stable for its whole life.
pub fn segment_relative_path(opened_at: DateTime<Utc>, segment_id: i64) -> PathBuf {
    PathBuf::from(format!(
        "{:04}/{:02}/{:02}/segment_{}.mp4",
        opened_at.year(),
        opened_at.month(),
        opened_at.day(),
        segment_id
    ))
}

/// Recovers a segment id from a relative path produced by
/// `segment_relative_path`. Used by the storage-root orphan sweep to find
/// files with no matching catalog row.
pub fn segment_id_from_path(path: &std::path::Path) -> Option<i64> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("segment_")?.parse().ok()
}
