//! Repository-level tests against the SQLite metadata store.

use barge_metadata::models::{ChunkRow, UploadRow};
use barge_metadata::{ChunkRepo, FinalizeClaim, MetadataError, SqliteStore, UploadRepo};
use tempfile::tempdir;
use time::OffsetDateTime;
use uuid::Uuid;

async fn build_store() -> (tempfile::TempDir, SqliteStore) {
    let temp = tempdir().unwrap();
    let store = SqliteStore::new(temp.path().join("barge.db")).await.unwrap();
    (temp, store)
}

fn build_upload(filename: &str, total_size: i64, created_at: OffsetDateTime) -> UploadRow {
    UploadRow {
        upload_id: Uuid::new_v4(),
        filename: filename.to_string(),
        total_size,
        total_chunks: 3,
        chunk_size: 1024 * 1024,
        status: "UPLOADING".to_string(),
        final_hash: None,
        error_detail: None,
        created_at,
        updated_at: created_at,
    }
}

fn build_chunk(upload_id: Uuid, index: i64, received_at: OffsetDateTime) -> ChunkRow {
    ChunkRow {
        upload_id,
        chunk_index: index,
        status: "UPLOADED".to_string(),
        received_at,
    }
}

#[tokio::test]
async fn create_and_get_upload() {
    let (_temp, store) = build_store().await;
    let upload = build_upload("a.bin", 100, OffsetDateTime::now_utc());

    store.create_upload(&upload).await.unwrap();
    let fetched = store.get_upload(upload.upload_id).await.unwrap().unwrap();

    assert_eq!(fetched.filename, "a.bin");
    assert_eq!(fetched.total_size, 100);
    assert_eq!(fetched.status, "UPLOADING");
    assert!(fetched.final_hash.is_none());

    assert!(store.get_upload(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_resumable_picks_latest_uploading() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();

    let older = build_upload("same.bin", 100, now - time::Duration::hours(2));
    let newer = build_upload("same.bin", 100, now - time::Duration::hours(1));
    let other_size = build_upload("same.bin", 200, now);
    store.create_upload(&older).await.unwrap();
    store.create_upload(&newer).await.unwrap();
    store.create_upload(&other_size).await.unwrap();

    let found = store.find_resumable("same.bin", 100).await.unwrap().unwrap();
    assert_eq!(found.upload_id, newer.upload_id);

    assert!(store.find_resumable("other.bin", 100).await.unwrap().is_none());
}

#[tokio::test]
async fn find_resumable_ignores_terminal_uploads() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();

    let upload = build_upload("done.bin", 100, now);
    store.create_upload(&upload).await.unwrap();
    store.begin_processing(upload.upload_id, now).await.unwrap();
    store
        .complete_upload(upload.upload_id, &"a".repeat(64), now)
        .await
        .unwrap();

    assert!(store.find_resumable("done.bin", 100).await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_chunk_is_idempotent() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("chunky.bin", 100, now);
    store.create_upload(&upload).await.unwrap();

    store
        .upsert_chunk(&build_chunk(upload.upload_id, 1, now))
        .await
        .unwrap();
    let later = now + time::Duration::seconds(5);
    store
        .upsert_chunk(&build_chunk(upload.upload_id, 1, later))
        .await
        .unwrap();

    assert_eq!(store.count_chunks(upload.upload_id).await.unwrap(), 1);
    let chunk = store.get_chunk(upload.upload_id, 1).await.unwrap().unwrap();
    assert_eq!(chunk.received_at, later);
}

#[tokio::test]
async fn upsert_chunk_touches_parent_updated_at() {
    let (_temp, store) = build_store().await;
    let created = OffsetDateTime::now_utc() - time::Duration::hours(5);
    let upload = build_upload("alive.bin", 100, created);
    store.create_upload(&upload).await.unwrap();

    let received = OffsetDateTime::now_utc();
    store
        .upsert_chunk(&build_chunk(upload.upload_id, 0, received))
        .await
        .unwrap();

    let row = store.get_upload(upload.upload_id).await.unwrap().unwrap();
    assert_eq!(row.updated_at, received);
}

#[tokio::test]
async fn upsert_chunk_requires_parent_upload() {
    let (_temp, store) = build_store().await;
    let orphan = build_chunk(Uuid::new_v4(), 0, OffsetDateTime::now_utc());
    assert!(store.upsert_chunk(&orphan).await.is_err());
}

#[tokio::test]
async fn uploaded_indexes_are_sorted() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("sorted.bin", 100, now);
    store.create_upload(&upload).await.unwrap();

    for index in [2i64, 0, 1] {
        store
            .upsert_chunk(&build_chunk(upload.upload_id, index, now))
            .await
            .unwrap();
    }

    assert_eq!(
        store.get_uploaded_indexes(upload.upload_id).await.unwrap(),
        vec![0, 1, 2]
    );
}

#[tokio::test]
async fn begin_processing_has_exactly_one_winner() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("contested.bin", 100, now);
    store.create_upload(&upload).await.unwrap();

    let first = store
        .begin_processing(upload.upload_id, now)
        .await
        .unwrap()
        .unwrap();
    match first {
        FinalizeClaim::Claimed(row) => assert_eq!(row.status, "PROCESSING"),
        FinalizeClaim::Observed(_) => panic!("first caller must win the claim"),
    }

    let second = store
        .begin_processing(upload.upload_id, now)
        .await
        .unwrap()
        .unwrap();
    match second {
        FinalizeClaim::Claimed(_) => panic!("second caller must not win the claim"),
        FinalizeClaim::Observed(row) => assert_eq!(row.status, "PROCESSING"),
    }

    assert!(
        store
            .begin_processing(Uuid::new_v4(), now)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn complete_upload_requires_processing_state() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("strict.bin", 100, now);
    store.create_upload(&upload).await.unwrap();

    // Direct UPLOADING -> COMPLETED is not a legal transition
    let err = store
        .complete_upload(upload.upload_id, &"b".repeat(64), now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MetadataError::InvalidStateTransition { .. }
    ));

    store.begin_processing(upload.upload_id, now).await.unwrap();
    store
        .complete_upload(upload.upload_id, &"b".repeat(64), now)
        .await
        .unwrap();

    let row = store.get_upload(upload.upload_id).await.unwrap().unwrap();
    assert_eq!(row.status, "COMPLETED");
    assert_eq!(row.final_hash.as_deref(), Some("b".repeat(64).as_str()));
}

#[tokio::test]
async fn fail_upload_is_noop_on_terminal_uploads() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("terminal.bin", 100, now);
    store.create_upload(&upload).await.unwrap();
    store.begin_processing(upload.upload_id, now).await.unwrap();
    store
        .complete_upload(upload.upload_id, &"c".repeat(64), now)
        .await
        .unwrap();

    store
        .fail_upload(upload.upload_id, Some("too late"), now)
        .await
        .unwrap();

    let row = store.get_upload(upload.upload_id).await.unwrap().unwrap();
    assert_eq!(row.status, "COMPLETED");
}

#[tokio::test]
async fn fail_upload_records_detail() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("doomed.bin", 100, now);
    store.create_upload(&upload).await.unwrap();

    store
        .fail_upload(upload.upload_id, Some("hash mismatch"), now)
        .await
        .unwrap();

    let row = store.get_upload(upload.upload_id).await.unwrap().unwrap();
    assert_eq!(row.status, "FAILED");
    assert_eq!(row.error_detail.as_deref(), Some("hash mismatch"));
}

#[tokio::test]
async fn stale_query_filters_by_status_and_age() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();

    let stale = build_upload("old.bin", 100, now - time::Duration::hours(48));
    let fresh = build_upload("new.bin", 100, now);
    let old_but_done = build_upload("olddone.bin", 100, now - time::Duration::hours(48));
    store.create_upload(&stale).await.unwrap();
    store.create_upload(&fresh).await.unwrap();
    store.create_upload(&old_but_done).await.unwrap();
    store
        .begin_processing(old_but_done.upload_id, now - time::Duration::hours(48))
        .await
        .unwrap();

    let cutoff = now - time::Duration::hours(24);
    let found = store.get_stale_uploads(cutoff, 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].upload_id, stale.upload_id);
}

#[tokio::test]
async fn delete_upload_cascades_to_chunks() {
    let (_temp, store) = build_store().await;
    let now = OffsetDateTime::now_utc();
    let upload = build_upload("cascade.bin", 100, now);
    store.create_upload(&upload).await.unwrap();
    store
        .upsert_chunk(&build_chunk(upload.upload_id, 0, now))
        .await
        .unwrap();

    store.delete_upload(upload.upload_id).await.unwrap();

    assert!(store.get_upload(upload.upload_id).await.unwrap().is_none());
    assert_eq!(store.count_chunks(upload.upload_id).await.unwrap(), 0);

    let err = store.delete_upload(upload.upload_id).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}
