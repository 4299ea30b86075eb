//! Error type for `docreg-blob`.

use docreg_core::blob::BlobKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("blob not found: {0}")]
  NotFound(BlobKey),

  #[error("malformed blob key: {0:?}")]
  InvalidKey(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
