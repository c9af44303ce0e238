//! Upload pipeline state machine
//!
//! An upload progresses through:
//! RECEIVED → STAGED → TYPEVALIDATED → DUPLICATECHECKED → DECODED → PERSISTED → CLEANED
//!
//! FAILED is reachable from every non-terminal state. A failure after staging
//! still moves on to CLEANED once the temp file is released, so the session
//! remembers the failure kind separately from the current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadState {
    /// Request accepted, nothing on disk yet
    Received,
    /// Raw bytes written to a temp file
    Staged,
    /// Declared content type is CSV
    TypeValidated,
    /// No record with the same name exists
    DuplicateChecked,
    /// Temp file parsed into rows
    Decoded,
    /// Record inserted into the store
    Persisted,
    /// Temp file released
    Cleaned,
    /// Pipeline stopped with an error
    Failed,
}

/// Why an upload failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    MissingFile,
    Interrupted,
    TooLarge,
    InvalidType,
    Duplicate,
    DecodeError,
    StoreError,
    Internal,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub upload_id: Uuid,
    pub old_state: UploadState,
    pub new_state: UploadState,
    pub transitioned_at: DateTime<Utc>,
}

/// Per-request pipeline bookkeeping (in-memory only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: Uuid,

    /// Original filename as sent by the client
    pub original_name: String,

    pub state: UploadState,

    /// Set once when the pipeline fails; kept through the CLEANED transition
    pub failure: Option<FailureKind>,

    /// Every state entered, in order, starting with RECEIVED
    pub history: Vec<UploadState>,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(original_name: impl Into<String>) -> Self {
        Self {
            upload_id: Uuid::new_v4(),
            original_name: original_name.into(),
            state: UploadState::Received,
            failure: None,
            history: vec![UploadState::Received],
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: UploadState) -> StateTransition {
        let transition = StateTransition {
            upload_id: self.upload_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        self.history.push(new_state);

        if self.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    /// Record a failure; the first failure wins
    pub fn fail(&mut self, kind: FailureKind) -> StateTransition {
        if self.failure.is_none() {
            self.failure = Some(kind);
        }
        self.transition_to(UploadState::Failed)
    }

    /// Whether the temp file has been written and must be released
    pub fn was_staged(&self) -> bool {
        self.history.contains(&UploadState::Staged)
    }

    /// CLEANED always ends a session; FAILED ends it only when nothing was staged
    pub fn is_terminal(&self) -> bool {
        match self.state {
            UploadState::Cleaned => true,
            UploadState::Failed => !self.was_staged(),
            _ => false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == UploadState::Cleaned && self.failure.is_none()
    }
}
