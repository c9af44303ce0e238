//! Stored CSV records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One parsed CSV line: ordered string fields
pub type Row = Vec<String>;

/// A CSV upload as persisted by the record store
///
/// Never updated in place; `updated_at` equals `created_at` for the life of
/// the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedRecord {
    /// Assigned by the store on insert
    pub id: Uuid,

    /// Original filename of the upload (unique among records)
    pub name: String,

    /// Parsed rows; row 0 is treated as the header for display
    pub rows: Vec<Row>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadedRecord {
    /// First row, conventionally the column headings
    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            id: self.id,
            name: self.name.clone(),
            row_count: self.rows.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Record contents before the store assigns identity and timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub name: String,
    pub rows: Vec<Row>,
}

impl NewRecord {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// Row-less projection of a record for listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: Uuid,
    pub name: String,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
