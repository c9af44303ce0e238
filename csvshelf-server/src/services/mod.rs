//! Upload pipeline components

pub mod csv_decoder;
pub mod duplicate_guard;
pub mod temp_storage;
pub mod upload_pipeline;

pub use csv_decoder::{decode, decode_bytes, DecodeError, ParsedCsv};
pub use duplicate_guard::DuplicateGuard;
pub use temp_storage::{StagedUpload, StagingError, TempStorage};
pub use upload_pipeline::{
    is_csv_media_type, StoredUpload, UploadFailure, UploadMeta, UploadPipeline, CSV_MEDIA_TYPE,
};
