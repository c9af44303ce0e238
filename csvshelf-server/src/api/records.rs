//! Record endpoints
//!
//! POST /api/records         upload a CSV (multipart field `csv`)
//! GET /api/records          list record summaries
//! GET /api/records/:id      one record with its rows
//! DELETE /api/records/:id   delete a record

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use csvshelf_common::uuid_utils;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{RecordSummary, Row, UploadedRecord};
use crate::services::{StoredUpload, UploadFailure, UploadMeta};
use crate::AppState;

/// Multipart field carrying the uploaded file
pub const UPLOAD_FIELD: &str = "csv";

/// Full record as returned by GET /api/records/:id
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub name: String,
    /// Row 0, empty when the record has no rows
    pub header: Row,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UploadedRecord> for RecordResponse {
    fn from(record: UploadedRecord) -> Self {
        let header = record.header().cloned().unwrap_or_default();
        let row_count = record.row_count();
        Self {
            id: record.id,
            name: record.name,
            header,
            rows: record.rows,
            row_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: Uuid,
}

fn parse_record_id(raw: &str) -> ApiResult<Uuid> {
    uuid_utils::parse(raw).map_err(|_| ApiError::BadRequest(format!("Invalid record id: {}", raw)))
}

/// POST /api/records
///
/// Streams the `csv` part through the upload pipeline. Other parts are skipped.
pub async fn upload_record(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<StoredUpload>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let meta = UploadMeta {
            field_name: UPLOAD_FIELD.to_string(),
            original_name: field.file_name().unwrap_or_default().to_string(),
            content_type: field.content_type().map(str::to_string),
        };

        let stored = state.pipeline.process_stream(meta, Box::pin(field)).await?;
        return Ok((StatusCode::CREATED, Json(stored)));
    }

    tracing::warn!("Upload request without a '{}' field", UPLOAD_FIELD);
    Err(UploadFailure::MissingFile.into())
}

/// GET /api/records
pub async fn list_records(State(state): State<AppState>) -> ApiResult<Json<Vec<RecordSummary>>> {
    let summaries = state.store.list_summaries().await?;
    Ok(Json(summaries))
}

/// GET /api/records/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RecordResponse>> {
    let id = parse_record_id(&id)?;
    let record = state.store.find_by_id(id).await?;
    Ok(Json(record.into()))
}

/// DELETE /api/records/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = parse_record_id(&id)?;
    state.store.delete_by_id(id).await?;
    tracing::info!(id = %id, "Record deleted");
    Ok(Json(DeleteResponse { deleted: id }))
}

/// Build record routes
pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/api/records", get(list_records).post(upload_record))
        .route("/api/records/:id", get(get_record).delete(delete_record))
}
