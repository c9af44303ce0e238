//! Upload pipeline integration tests
//!
//! Each test gets its own temp root with a fresh database and upload
//! directory, wired the same way `main` wires them.

use bytes::Bytes;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use csvshelf_server::db::{RecordStore, SqliteRecordStore, StoreError};
use csvshelf_server::models::NewRecord;
use csvshelf_server::services::{
    DecodeError, StoredUpload, TempStorage, UploadFailure, UploadMeta, UploadPipeline,
};

const LIMIT: u64 = 1024;

struct Fixture {
    _root: TempDir,
    store: Arc<dyn RecordStore>,
    pipeline: UploadPipeline,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_limit(LIMIT).await
    }

    async fn with_limit(limit: u64) -> Self {
        let root = tempfile::tempdir().unwrap();
        let pool = csvshelf_common::db::init_database(&root.path().join("csvshelf.db"))
            .await
            .unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(pool));
        let storage = TempStorage::new(root.path().join("uploads").join("csv"), limit);
        let pipeline = UploadPipeline::new(storage, store.clone());
        Self {
            _root: root,
            store,
            pipeline,
        }
    }

    async fn upload(
        &self,
        name: &str,
        content_type: &str,
        body: &'static [u8],
    ) -> Result<StoredUpload, UploadFailure> {
        self.pipeline
            .process_bytes(meta(name, Some(content_type)), Bytes::from_static(body))
            .await
    }

    fn staged_files(&self) -> usize {
        file_count(self.pipeline.storage().dir())
    }
}

fn meta(name: &str, content_type: Option<&str>) -> UploadMeta {
    UploadMeta {
        field_name: "csv".to_string(),
        original_name: name.to_string(),
        content_type: content_type.map(str::to_string),
    }
}

fn file_count(dir: &Path) -> usize {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn test_upload_then_read_back_preserves_rows() {
    let fx = Fixture::new().await;

    let stored = fx
        .upload("people.csv", "text/csv", b"name,note\nada,\"hello, world\"\ngrace,\"two\nlines\"\n")
        .await
        .unwrap();
    assert_eq!(stored.name, "people.csv");
    assert_eq!(stored.row_count, 3);

    let record = fx.store.find_by_id(stored.id).await.unwrap();
    assert_eq!(
        record.rows,
        vec![
            vec!["name".to_string(), "note".to_string()],
            vec!["ada".to_string(), "hello, world".to_string()],
            vec!["grace".to_string(), "two\nlines".to_string()],
        ]
    );
    assert_eq!(record.created_at, record.updated_at);
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_same_name_twice_is_duplicate() {
    let fx = Fixture::new().await;

    fx.upload("dup.csv", "text/csv", b"a,b\n1,2\n").await.unwrap();
    let err = fx.upload("dup.csv", "text/csv", b"c,d\n3,4\n").await.unwrap_err();

    assert!(matches!(err, UploadFailure::Duplicate { ref name } if name == "dup.csv"));
    let all = fx.store.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].rows[0], vec!["a".to_string(), "b".to_string()]);
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_non_csv_type_rejected_and_temp_file_removed() {
    let fx = Fixture::new().await;

    let err = fx.upload("notes.csv", "text/plain", b"a,b\n").await.unwrap_err();
    assert!(matches!(err, UploadFailure::InvalidType { ref declared } if declared == "text/plain"));

    let err = fx
        .pipeline
        .process_bytes(meta("notes.csv", None), Bytes::from_static(b"a,b\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadFailure::InvalidType { .. }));

    assert_eq!(fx.staged_files(), 0);
    assert!(fx.store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unterminated_quote_persists_nothing() {
    let fx = Fixture::new().await;

    let err = fx
        .upload("broken.csv", "text/csv", b"a,b\n1,\"never closed\n")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadFailure::Decode(DecodeError::UnterminatedQuote { line: 2 })));
    assert!(matches!(
        fx.store.find_by_name("broken.csv").await,
        Err(StoreError::NameNotFound(_))
    ));
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_bom_prefixed_unterminated_quote_persists_nothing() {
    let fx = Fixture::new().await;

    let err = fx
        .upload("excel.csv", "text/csv", b"\xEF\xBB\xBF\"a,b\n1,2\n")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadFailure::Decode(DecodeError::UnterminatedQuote { line: 1 })));
    assert!(fx.store.list_all().await.unwrap().is_empty());
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_empty_file_is_decode_error() {
    let fx = Fixture::new().await;

    let err = fx.upload("empty.csv", "text/csv", b"").await.unwrap_err();
    assert!(matches!(err, UploadFailure::Decode(DecodeError::Empty)));
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_oversize_upload_is_too_large() {
    let fx = Fixture::with_limit(8).await;

    let err = fx
        .upload("big.csv", "text/csv", b"a,b,c,d,e\n1,2,3,4,5\n")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadFailure::TooLarge { limit: 8 }));
    assert_eq!(fx.staged_files(), 0);
    assert!(fx.store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_oversize_streamed_upload_is_too_large() {
    let fx = Fixture::with_limit(10).await;

    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"a,b\n")),
        Ok(Bytes::from_static(b"1,2\n")),
        Ok(Bytes::from_static(b"3,4\n")),
    ];
    let err = fx
        .pipeline
        .process_stream(meta("chunks.csv", Some("text/csv")), futures::stream::iter(chunks))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadFailure::TooLarge { limit: 10 }));
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_interrupted_stream_leaves_no_temp_file() {
    let fx = Fixture::new().await;

    let chunks = vec![
        Ok(Bytes::from_static(b"a,b\n")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "client went away")),
    ];
    let err = fx
        .pipeline
        .process_stream(meta("cut.csv", Some("text/csv")), futures::stream::iter(chunks))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadFailure::Interrupted(_)));
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_missing_filename_is_missing_file() {
    let fx = Fixture::new().await;

    let err = fx.upload("", "text/csv", b"a\n").await.unwrap_err();
    assert!(matches!(err, UploadFailure::MissingFile));
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_upload_dir_empty_after_every_outcome() {
    let fx = Fixture::new().await;

    let _ = fx.upload("ok.csv", "text/csv", b"a\n1\n").await;
    let _ = fx.upload("ok.csv", "text/csv", b"a\n1\n").await;
    let _ = fx.upload("wrong.csv", "application/json", b"{}").await;
    let _ = fx.upload("bad.csv", "text/csv", b"\"open").await;
    let _ = fx.upload("bytes.csv", "text/csv", b"\xff\xfe\n").await;

    assert_eq!(fx.staged_files(), 0);
    assert_eq!(fx.store.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancelled_upload_removes_temp_file() {
    let fx = Fixture::new().await;

    // A body that never finishes keeps the upload parked after staging began
    let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"a,b\n"))])
        .chain(futures::stream::pending());
    let upload = fx
        .pipeline
        .process_stream(meta("slow.csv", Some("text/csv")), Box::pin(body));

    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(100), upload).await;
    assert!(timed_out.is_err());

    assert_eq!(fx.staged_files(), 0);
    assert!(fx.store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_then_lookup_and_delete_again_not_found() {
    let fx = Fixture::new().await;

    let stored = fx.upload("gone.csv", "text/csv", b"a\n1\n").await.unwrap();
    fx.store.delete_by_id(stored.id).await.unwrap();

    assert!(matches!(
        fx.store.find_by_id(stored.id).await,
        Err(StoreError::NotFound(id)) if id == stored.id
    ));
    assert!(matches!(
        fx.store.delete_by_id(stored.id).await,
        Err(StoreError::NotFound(_))
    ));

    // The name is free again
    fx.upload("gone.csv", "text/csv", b"b\n2\n").await.unwrap();
}

#[tokio::test]
async fn test_concurrent_same_name_uploads_store_one_record() {
    let fx = Fixture::new().await;

    let (first, second) = tokio::join!(
        fx.upload("race.csv", "text/csv", b"a,b\n1,2\n"),
        fx.upload("race.csv", "text/csv", b"a,b\n3,4\n"),
    );

    let outcomes = [first, second];
    let stored = outcomes.iter().filter(|r| r.is_ok()).count();
    let duplicates = outcomes
        .iter()
        .filter(|r| matches!(r, Err(UploadFailure::Duplicate { .. })))
        .count();

    assert_eq!(stored, 1);
    assert_eq!(duplicates, 1);
    assert_eq!(fx.store.list_all().await.unwrap().len(), 1);
    assert_eq!(fx.staged_files(), 0);
}

#[tokio::test]
async fn test_store_insert_of_existing_name_maps_to_duplicate() {
    let fx = Fixture::new().await;

    // Record inserted behind the pipeline's back, as a racing request would
    fx.store
        .insert(NewRecord::new("sneaky.csv", vec![vec!["x".to_string()]]))
        .await
        .unwrap();

    let err = fx.upload("sneaky.csv", "text/csv", b"y\n").await.unwrap_err();
    assert!(matches!(err, UploadFailure::Duplicate { .. }));
}
