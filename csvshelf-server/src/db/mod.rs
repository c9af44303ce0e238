//! Record persistence
//!
//! `RecordStore` is the seam between the upload pipeline / HTTP handlers and
//! the database. `SqliteRecordStore` is the production implementation over
//! the pool opened by `csvshelf_common::db::init_database`.

pub mod record_store;
pub mod sqlite_store;

pub use record_store::{RecordStore, StoreError, StoreResult};
pub use sqlite_store::SqliteRecordStore;
