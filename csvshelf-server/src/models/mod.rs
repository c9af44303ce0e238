//! Data models for csvshelf-server

pub mod record;
pub mod upload_session;

pub use record::{NewRecord, RecordSummary, Row, UploadedRecord};
pub use upload_session::{FailureKind, StateTransition, UploadSession, UploadState};
