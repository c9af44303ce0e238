//! Duplicate name pre-check
//!
//! Best effort: the lookup and the later insert are separate statements, so
//! two concurrent uploads of the same name can both pass. The unique index
//! on `csv_records.name` catches the loser at insert time.

use std::sync::Arc;

use crate::db::{RecordStore, StoreResult};

#[derive(Clone)]
pub struct DuplicateGuard {
    store: Arc<dyn RecordStore>,
}

impl DuplicateGuard {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Whether a record named exactly `name` (case-sensitive) exists
    pub async fn exists(&self, name: &str) -> StoreResult<bool> {
        match self.store.find_by_name(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
