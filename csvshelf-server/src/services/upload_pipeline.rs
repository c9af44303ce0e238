//! Upload-parse-persist pipeline
//!
//! Stage → validate type → duplicate check → decode → persist → release.
//! Steps run strictly in that order within one upload. Every upload that
//! reaches STAGED is released before `process_*` returns, whatever the
//! outcome; a cancelled request releases through the guard's `Drop`.

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::csv_decoder::{self, DecodeError};
use super::duplicate_guard::DuplicateGuard;
use super::temp_storage::{StagedUpload, StagingError, TempStorage};
use crate::db::{RecordStore, StoreError};
use crate::models::{FailureKind, NewRecord, UploadSession, UploadState};

/// Media type accepted for uploads
pub const CSV_MEDIA_TYPE: &str = "text/csv";

/// Client-declared facts about one uploaded file
#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// Multipart field name, used as the staging file prefix
    pub field_name: String,
    /// Original filename; becomes the record name
    pub original_name: String,
    /// Declared content type of the part
    pub content_type: Option<String>,
}

/// Successful upload outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredUpload {
    pub id: Uuid,
    pub name: String,
    pub row_count: usize,
}

/// Typed upload failure; exactly one per failed request
#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("No CSV file was uploaded")]
    MissingFile,

    #[error("Upload interrupted: {0}")]
    Interrupted(String),

    #[error("File too large: limit is {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Only CSV files are allowed (declared type: {declared})")]
    InvalidType { declared: String },

    #[error("CSV already exists: {name}")]
    Duplicate { name: String },

    #[error("Could not parse CSV: {0}")]
    Decode(DecodeError),

    #[error("Could not store CSV: {0}")]
    Store(StoreError),

    #[error("Upload failed: {0}")]
    Internal(String),
}

impl UploadFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            UploadFailure::MissingFile => FailureKind::MissingFile,
            UploadFailure::Interrupted(_) => FailureKind::Interrupted,
            UploadFailure::TooLarge { .. } => FailureKind::TooLarge,
            UploadFailure::InvalidType { .. } => FailureKind::InvalidType,
            UploadFailure::Duplicate { .. } => FailureKind::Duplicate,
            UploadFailure::Decode(_) => FailureKind::DecodeError,
            UploadFailure::Store(_) => FailureKind::StoreError,
            UploadFailure::Internal(_) => FailureKind::Internal,
        }
    }
}

impl From<StagingError> for UploadFailure {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::TooLarge { limit } => UploadFailure::TooLarge { limit },
            StagingError::Interrupted(msg) => UploadFailure::Interrupted(msg),
            StagingError::Io(e) => UploadFailure::Internal(format!("staging failed: {}", e)),
        }
    }
}

impl From<DecodeError> for UploadFailure {
    fn from(err: DecodeError) -> Self {
        match err {
            // The staged file vanished or is unreadable: not the client's fault
            DecodeError::Read(e) => UploadFailure::Internal(format!("reading staged file failed: {}", e)),
            other => UploadFailure::Decode(other),
        }
    }
}

impl From<StoreError> for UploadFailure {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(name) => UploadFailure::Duplicate { name },
            other => UploadFailure::Store(other),
        }
    }
}

/// Whether a declared content type is CSV (parameters such as charset ignored)
pub fn is_csv_media_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(CSV_MEDIA_TYPE))
        .unwrap_or(false)
}

/// Composes temp storage, duplicate guard, decoder and record store
pub struct UploadPipeline {
    storage: TempStorage,
    store: Arc<dyn RecordStore>,
    guard: DuplicateGuard,
}

impl UploadPipeline {
    pub fn new(storage: TempStorage, store: Arc<dyn RecordStore>) -> Self {
        let guard = DuplicateGuard::new(store.clone());
        Self {
            storage,
            store,
            guard,
        }
    }

    pub fn storage(&self) -> &TempStorage {
        &self.storage
    }

    /// Run the pipeline over an in-memory upload
    pub async fn process_bytes(&self, meta: UploadMeta, bytes: Bytes) -> Result<StoredUpload, UploadFailure> {
        let body = futures::stream::iter([Ok::<_, Infallible>(bytes)]);
        self.process_stream(meta, body).await
    }

    /// Run the pipeline over a chunked upload body
    pub async fn process_stream<S, E>(&self, meta: UploadMeta, body: S) -> Result<StoredUpload, UploadFailure>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let mut session = UploadSession::new(meta.original_name.clone());
        tracing::info!(
            upload_id = %session.upload_id,
            name = %meta.original_name,
            content_type = ?meta.content_type,
            "Upload received"
        );

        if meta.original_name.trim().is_empty() {
            return Err(Self::fail_unstaged(&mut session, UploadFailure::MissingFile));
        }

        // RECEIVED → STAGED; nothing to clean up if this fails
        let staged = match self.storage.stage_stream(&meta.field_name, body).await {
            Ok(staged) => staged,
            Err(e) => return Err(Self::fail_unstaged(&mut session, e.into())),
        };
        Self::advance(&mut session, UploadState::Staged);
        tracing::debug!(
            upload_id = %session.upload_id,
            bytes = staged.len(),
            path = %staged.path().display(),
            "Upload staged"
        );

        let result = self.run_staged(&mut session, &meta, &staged).await;

        if let Err(ref failure) = result {
            session.fail(failure.kind());
        }

        // → CLEANED on every path past staging
        if let Err(e) = staged.release().await {
            tracing::error!(
                upload_id = %session.upload_id,
                error = %e,
                "Failed to release staged upload"
            );
        }
        Self::advance(&mut session, UploadState::Cleaned);

        match &result {
            Ok(stored) => tracing::info!(
                upload_id = %session.upload_id,
                id = %stored.id,
                name = %stored.name,
                rows = stored.row_count,
                "Upload stored"
            ),
            Err(failure) => tracing::warn!(
                upload_id = %session.upload_id,
                name = %meta.original_name,
                kind = ?failure.kind(),
                error = %failure,
                "Upload rejected"
            ),
        }

        result
    }

    async fn run_staged(
        &self,
        session: &mut UploadSession,
        meta: &UploadMeta,
        staged: &StagedUpload,
    ) -> Result<StoredUpload, UploadFailure> {
        if !is_csv_media_type(meta.content_type.as_deref()) {
            return Err(UploadFailure::InvalidType {
                declared: meta
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "none".to_string()),
            });
        }
        Self::advance(session, UploadState::TypeValidated);

        if self.guard.exists(&meta.original_name).await? {
            return Err(UploadFailure::Duplicate {
                name: meta.original_name.clone(),
            });
        }
        Self::advance(session, UploadState::DuplicateChecked);

        let parsed = csv_decoder::decode(staged.path()).await?;
        Self::advance(session, UploadState::Decoded);

        let row_count = parsed.len();
        let id = self
            .store
            .insert(NewRecord::new(meta.original_name.clone(), parsed.into_rows()))
            .await?;
        Self::advance(session, UploadState::Persisted);

        Ok(StoredUpload {
            id,
            name: meta.original_name.clone(),
            row_count,
        })
    }

    fn advance(session: &mut UploadSession, state: UploadState) {
        let transition = session.transition_to(state);
        tracing::trace!(
            upload_id = %transition.upload_id,
            from = ?transition.old_state,
            to = ?transition.new_state,
            "Upload state transition"
        );
    }

    fn fail_unstaged(session: &mut UploadSession, failure: UploadFailure) -> UploadFailure {
        session.fail(failure.kind());
        tracing::warn!(
            upload_id = %session.upload_id,
            kind = ?failure.kind(),
            error = %failure,
            "Upload rejected before staging"
        );
        failure
    }
}
