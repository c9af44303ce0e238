//! csvshelf-server library interface
//!
//! Exposes the router and its building blocks for integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::RecordStore;
use crate::services::UploadPipeline;

/// Room for multipart boundaries and part headers on top of the file limit
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Record store used by the read and delete endpoints
    pub store: Arc<dyn RecordStore>,
    /// Upload pipeline (owns the temp storage)
    pub pipeline: Arc<UploadPipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, pipeline: UploadPipeline) -> Self {
        Self {
            store,
            pipeline: Arc::new(pipeline),
            startup_time: Utc::now(),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.pipeline.storage().max_bytes()
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .merge(api::ui_routes())
        .merge(api::record_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
