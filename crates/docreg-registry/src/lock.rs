//! Lock acquisition and release.
//!
//! The token on the identity row is the mutex; every transition here is a
//! single repository call that re-checks it atomically.

use std::sync::Arc;

use docreg_core::{
  Conflict,
  document::{Document, DocumentIdentity, LockToken},
  store::{Repository, Saved, Unlock},
};
use rand_core::{OsRng, RngCore as _};
use uuid::Uuid;

use crate::{Error, Result};

/// Token entropy in bytes.
const TOKEN_BYTES: usize = 32;

/// A fresh opaque token: 256 random bits, hex-encoded.
pub fn mint_token() -> LockToken {
  let mut bytes = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  LockToken::new(hex::encode(bytes))
}

/// Fail unless `token` holds the lock on `identity`.
pub fn check_holder(identity: &DocumentIdentity, token: &LockToken) -> Result<()> {
  match &identity.lock_token {
    None => Err(Conflict::Unlocked.into()),
    Some(held) if held != token => Err(Conflict::IncorrectLockId.into()),
    Some(_) => Ok(()),
  }
}

pub struct LockManager<R> {
  repo: Arc<R>,
}

impl<R: Repository> LockManager<R> {
  pub fn new(repo: Arc<R>) -> Self { Self { repo } }

  /// Lock `id` under a fresh token and open a working copy.
  pub async fn lock(&self, id: Uuid, allow_final: bool) -> Result<Document> {
    let doc = self
      .repo
      .acquire_lock(id, mint_token(), chrono::Utc::now(), allow_final)
      .await
      .map_err(Error::store)?;
    tracing::info!(%id, version = doc.revision.version, "document locked");
    Ok(doc)
  }

  /// Holder release of a lock with no open parts.
  pub async fn release(&self, id: Uuid, token: LockToken) -> Result<Saved> {
    let saved = self
      .repo
      .release_lock(id, Unlock::Token(token))
      .await
      .map_err(Error::store)?;
    tracing::info!(%id, "document unlocked");
    Ok(saved)
  }

  /// Operator release: discards any upload in progress.
  pub async fn force(&self, id: Uuid) -> Result<Saved> {
    let saved = self
      .repo
      .release_lock(id, Unlock::Force)
      .await
      .map_err(Error::store)?;
    tracing::info!(%id, discarded = saved.released.len(), "document force-unlocked");
    Ok(saved)
  }
}
