//! Error type for `docreg-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] docreg_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored value could not be decoded back into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

impl From<docreg_core::Conflict> for Error {
  fn from(conflict: docreg_core::Conflict) -> Self { Self::Core(conflict.into()) }
}

impl From<Error> for docreg_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      other => docreg_core::Error::Backend(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Map a `UNIQUE` constraint violation to [`docreg_core::Error::Unique`] on
/// `field`; pass every other error through.
pub(crate) fn unique_on(field: &'static str) -> impl FnOnce(rusqlite::Error) -> Error {
  move |e| match &e {
    rusqlite::Error::SqliteFailure(failure, _)
      if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
    {
      Error::Core(docreg_core::Error::Unique { field })
    }
    _ => Error::Sqlite(e),
  }
}
