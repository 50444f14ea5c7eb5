//! Integration tests for the catalog database layer
//!
//! Tests cover segment lifecycle, frame insertion, the durable OCR queue,
//! extracted-text write-through, full-text search, and cascade deletes.

use chrono::{Duration, Utc};
use screensearch_db::{
    DatabaseManager, FrameFilter, NewFrame, NewRegion, NewSegment, Pagination, ProcessingStatus,
};
use tempfile::NamedTempFile;

async fn create_test_db() -> (DatabaseManager, String) {
    let temp_file = NamedTempFile::new().expect("failed to create temp file");
    let db_path = temp_file.path().to_string_lossy().to_string();
    drop(temp_file);

    let db = DatabaseManager::new(&db_path)
        .await
        .expect("failed to create test database");

    (db, db_path)
}

fn test_segment(opened_at: chrono::DateTime<Utc>) -> NewSegment {
    NewSegment {
        opened_at,
        relative_path: format!("2026/01/01/segment_{}.mp4", opened_at.timestamp_nanos_opt().unwrap()),
        width: 1920,
        height: 1080,
        display_id: 0,
    }
}

fn test_frame(segment_id: i64, index: i64, captured_at: chrono::DateTime<Utc>) -> NewFrame {
    NewFrame {
        segment_id,
        frame_index_in_segment: index,
        captured_at,
        display_id: 0,
        app_bundle_id: Some("com.google.Chrome".to_string()),
        app_name: Some("Chrome".to_string()),
        window_title: Some("Example - Google Chrome".to_string()),
        browser_url: None,
    }
}

#[tokio::test]
async fn test_database_initialization() {
    let (db, _path) = create_test_db().await;
    let stats = db.get_statistics().await.expect("failed to get statistics");
    assert_eq!(stats.frame_count, 0);
    assert_eq!(stats.segment_count, 0);
    assert_eq!(stats.queue_depth, 0);
    db.close().await;
}

#[tokio::test]
async fn test_segment_and_frame_insertion() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();

    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    assert!(segment_id > 0);

    let frame_id = db
        .insert_frame(test_frame(segment_id, 0, now))
        .await
        .expect("failed to insert frame");
    assert!(frame_id > 0);

    let frame = db.frame_by_id(frame_id).await.unwrap().unwrap();
    assert_eq!(frame.segment_id, segment_id);
    assert_eq!(frame.status(), ProcessingStatus::Pending);

    let segment = db.segment_by_id(segment_id).await.unwrap().unwrap();
    assert_eq!(segment.frame_count, 1, "trigger should bump frame_count");

    db.close().await;
}

#[tokio::test]
async fn test_only_one_open_segment_per_display_resolution() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();

    db.insert_segment(test_segment(now)).await.unwrap();
    let err = db.insert_segment(test_segment(now)).await.unwrap_err();
    assert!(matches!(err, screensearch_db::DatabaseError::InvariantViolation(_)));

    db.close().await;
}

#[tokio::test]
async fn test_close_segment_is_idempotent() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();

    db.close_segment(segment_id, now).await.unwrap();
    db.close_segment(segment_id, now + Duration::seconds(1))
        .await
        .unwrap();

    let segment = db.segment_by_id(segment_id).await.unwrap().unwrap();
    assert_eq!(segment.closed_at, Some(now));

    db.close().await;
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();

    db.enqueue_frame(frame_id, now, 0).await.unwrap();
    db.enqueue_frame(frame_id, now, 5).await.unwrap();

    assert_eq!(db.queue_depth().await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_dequeue_respects_priority_then_fifo() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();

    let low_priority_first = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    let high_priority_second = db
        .insert_frame(test_frame(segment_id, 1, now + Duration::seconds(1)))
        .await
        .unwrap();

    db.enqueue_frame(low_priority_first, now, 0).await.unwrap();
    db.enqueue_frame(high_priority_second, now + Duration::seconds(1), 10)
        .await
        .unwrap();

    let (_, frame) = db.dequeue_frame().await.unwrap().unwrap();
    assert_eq!(frame.id, high_priority_second, "higher priority dequeues first");
    assert_eq!(frame.status(), ProcessingStatus::Processing);

    let (_, frame) = db.dequeue_frame().await.unwrap().unwrap();
    assert_eq!(frame.id, low_priority_first);

    assert!(db.dequeue_frame().await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_requeue_resets_status_and_keeps_retry_count() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    db.enqueue_frame(frame_id, now, 0).await.unwrap();

    let (row, _) = db.dequeue_frame().await.unwrap().unwrap();
    db.requeue_frame(frame_id, now, row.priority, row.retry_count + 1, Some("transient io error"))
        .await
        .unwrap();

    let frame = db.frame_by_id(frame_id).await.unwrap().unwrap();
    assert_eq!(frame.status(), ProcessingStatus::Pending);
    assert_eq!(db.queue_depth().await.unwrap(), 1);

    let (row, _) = db.dequeue_frame().await.unwrap().unwrap();
    assert_eq!(row.retry_count, 1);
    assert_eq!(row.last_error.as_deref(), Some("transient io error"));

    db.close().await;
}

#[tokio::test]
async fn test_write_extracted_text_is_idempotent_on_reocr() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();

    let first_regions = vec![NewRegion {
        text_offset: 0,
        text_length: 5,
        x: 0,
        y: 0,
        width: 100,
        height: 20,
        chrome_bit: false,
        window_index: Some(0),
    }];
    db.write_extracted_text(frame_id, segment_id, "hello", "", &first_regions, None)
        .await
        .unwrap();
    assert_eq!(db.regions_for_frame(frame_id).await.unwrap().len(), 1);

    let second_regions = vec![
        NewRegion {
            text_offset: 0,
            text_length: 5,
            x: 0,
            y: 0,
            width: 100,
            height: 20,
            chrome_bit: false,
            window_index: Some(0),
        },
        NewRegion {
            text_offset: 6,
            text_length: 5,
            x: 0,
            y: 30,
            width: 100,
            height: 20,
            chrome_bit: false,
            window_index: Some(0),
        },
    ];
    db.write_extracted_text(frame_id, segment_id, "hello again", "", &second_regions, None)
        .await
        .unwrap();

    let regions = db.regions_for_frame(frame_id).await.unwrap();
    assert_eq!(regions.len(), 2, "re-OCR should replace, not accumulate, regions");

    let extracted = db.extracted_text_for_frame(frame_id).await.unwrap().unwrap();
    assert_eq!(extracted.full_text, "hello again");

    let frame = db.frame_by_id(frame_id).await.unwrap().unwrap();
    assert_eq!(frame.status(), ProcessingStatus::Completed);

    db.close().await;
}

#[tokio::test]
async fn test_write_extracted_text_persists_browser_url() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();

    db.write_extracted_text(
        frame_id,
        segment_id,
        "example.com - Home",
        "example.com - Home",
        &[],
        Some("https://example.com/"),
    )
    .await
    .unwrap();

    let frame = db.frame_by_id(frame_id).await.unwrap().unwrap();
    assert_eq!(frame.browser_url.as_deref(), Some("https://example.com/"));

    db.close().await;
}

#[tokio::test]
async fn test_fts_search_finds_extracted_text() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();

    let frame1 = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    db.write_extracted_text(frame1, segment_id, "database query language", "", &[], None)
        .await
        .unwrap();

    let frame2 = db
        .insert_frame(test_frame(segment_id, 1, now + Duration::seconds(1)))
        .await
        .unwrap();
    db.write_extracted_text(frame2, segment_id, "SQL database", "", &[], None)
        .await
        .unwrap();

    let frame3 = db
        .insert_frame(test_frame(segment_id, 2, now + Duration::seconds(2)))
        .await
        .unwrap();
    db.write_extracted_text(frame3, segment_id, "unrelated spreadsheet content", "", &[], None)
        .await
        .unwrap();

    let results = db
        .search_extracted_text("database", Pagination::default())
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
    let ids: Vec<i64> = results.iter().map(|(f, _)| f.id).collect();
    assert!(ids.contains(&frame1));
    assert!(ids.contains(&frame2));
    assert!(!ids.contains(&frame3));

    db.close().await;
}

#[tokio::test]
async fn test_delete_segment_cascades_everything() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    db.enqueue_frame(frame_id, now, 0).await.unwrap();
    db.write_extracted_text(frame_id, segment_id, "text", "", &[], None)
        .await
        .unwrap();

    db.delete_segment_cascade(segment_id).await.unwrap();

    assert!(db.frame_by_id(frame_id).await.unwrap().is_none());
    assert!(db.segment_by_id(segment_id).await.unwrap().is_none());
    assert!(db.extracted_text_for_frame(frame_id).await.unwrap().is_none());
    assert_eq!(db.regions_for_frame(frame_id).await.unwrap().len(), 0);
    assert_eq!(db.queue_depth().await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_crash_recovery_lists_processing_frames() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    let frame_id = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    db.enqueue_frame(frame_id, now, 0).await.unwrap();
    db.dequeue_frame().await.unwrap(); // leaves frame in `processing`, simulating a crash

    let crashed = db.list_crashed_processing_frames().await.unwrap();
    assert_eq!(crashed.len(), 1);
    assert_eq!(crashed[0].id, frame_id);

    db.close().await;
}

#[tokio::test]
async fn test_frames_in_range_filters_by_time_and_app() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();

    let frame1 = db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();
    let frame2 = db
        .insert_frame(test_frame(segment_id, 1, now + Duration::hours(2)))
        .await
        .unwrap();

    let filter = FrameFilter {
        start_time: Some(now - Duration::minutes(1)),
        end_time: Some(now + Duration::hours(1)),
        app_bundle_id: None,
        display_id: None,
    };

    let frames = db
        .frames_in_range(filter, Pagination::default())
        .await
        .unwrap();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, frame1);
    let _ = frame2;

    db.close().await;
}

#[tokio::test]
async fn test_sweep_orphan_rows_is_a_no_op_on_a_healthy_catalog() {
    let (db, _path) = create_test_db().await;
    let now = Utc::now();
    let segment_id = db.insert_segment(test_segment(now)).await.unwrap();
    db.insert_frame(test_frame(segment_id, 0, now)).await.unwrap();

    let removed = db.sweep_orphan_rows().await.unwrap();
    assert_eq!(removed, 0);

    db.close().await;
}
