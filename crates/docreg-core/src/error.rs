//! Error types for `docreg-core`.

use thiserror::Error;

use crate::validation::ValidationErrors;

/// A rejected state transition. Each variant has a stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
  #[error("the document is not locked")]
  Unlocked,

  #[error("the document is already locked")]
  ExistingLock,

  #[error("the lock token does not match")]
  IncorrectLockId,

  #[error("not all upload parts have been received")]
  IncompleteUpload,

  #[error("the document is still referenced by object links")]
  PendingRelations,

  #[error("a document with status FINAL cannot be modified")]
  FinalStatus,
}

impl Conflict {
  pub fn code(self) -> &'static str {
    match self {
      Self::Unlocked => "unlocked",
      Self::ExistingLock => "existing-lock",
      Self::IncorrectLockId => "incorrect-lock-id",
      Self::IncompleteUpload => "incomplete-upload",
      Self::PendingRelations => "pending-relations",
      Self::FinalStatus => "modify-status-definitief",
    }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  #[error("conflict: {0}")]
  Conflict(#[from] Conflict),

  #[error("{field} must be unique")]
  Unique { field: &'static str },

  #[error("validation failed: {0}")]
  Invalid(#[from] ValidationErrors),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("backend error: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
    Self::NotFound { kind, id: id.to_string() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
