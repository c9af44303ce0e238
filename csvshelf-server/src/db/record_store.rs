//! Record store abstraction

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewRecord, RecordSummary, UploadedRecord};

/// Record store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    /// No record with this name
    #[error("Record not found with name: {0}")]
    NameNotFound(String),

    /// Insert rejected by the unique name index
    #[error("Record already exists: {0}")]
    Duplicate(String),

    /// Store unreachable or rejected the operation
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data could not be decoded
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::NameNotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations for uploaded CSV records
///
/// Implementations assign `id`, `created_at` and `updated_at` on insert and
/// write the full row set in one statement, so a record is either fully
/// present or absent.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record, returning its assigned id
    async fn insert(&self, record: NewRecord) -> StoreResult<Uuid>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<UploadedRecord>;

    /// Exact, case-sensitive name lookup
    async fn find_by_name(&self, name: &str) -> StoreResult<UploadedRecord>;

    /// Delete by id; deleting an absent id reports `NotFound`
    async fn delete_by_id(&self, id: Uuid) -> StoreResult<()>;

    /// All records with rows, oldest first
    async fn list_all(&self) -> StoreResult<Vec<UploadedRecord>>;

    /// All records without rows, oldest first
    async fn list_summaries(&self) -> StoreResult<Vec<RecordSummary>>;
}
