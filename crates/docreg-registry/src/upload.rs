//! Chunked uploads: part allocation, part writes, and the commit that
//! stitches parts into one blob.

use std::{num::NonZeroU64, sync::Arc};

use bytes::Bytes;
use docreg_core::{
  Conflict,
  blob::{BlobKey, BlobStore},
  chunk,
  document::{LockToken, NewPart, UploadPart},
  store::{Repository, Saved},
  validation::ValidationCode,
};
use uuid::Uuid;

use crate::{Error, LockManager, Result, discard, lock};

/// How often a commit is retried when a part is rebound while its blobs are
/// being concatenated.
const FINALIZE_ATTEMPTS: usize = 3;

pub struct UploadCoordinator<R, B> {
  repo:       Arc<R>,
  blobs:      Arc<B>,
  locks:      LockManager<R>,
  chunk_size: NonZeroU64,
  max_parts:  u32,
}

impl<R: Repository, B: BlobStore> UploadCoordinator<R, B> {
  pub fn new(repo: Arc<R>, blobs: Arc<B>, chunk_size: NonZeroU64, max_parts: u32) -> Self {
    let locks = LockManager::new(repo.clone());
    Self { repo, blobs, locks, chunk_size, max_parts }
  }

  /// Parts for a body of `size` bytes. Fails with `file-size` on `size` when
  /// it needs more than the configured number of parts.
  pub fn allocate(&self, size: u64) -> Result<Vec<NewPart>> {
    let count = chunk::part_count(size, self.chunk_size);
    let too_large = || {
      Error::invalid(
        "size",
        ValidationCode::FileSize,
        format!(
          "{size} bytes need {count} parts of {} bytes; at most {} are allowed",
          self.chunk_size, self.max_parts
        ),
      )
    };
    if count > u64::from(self.max_parts) {
      return Err(too_large());
    }
    chunk::allocate(size, self.chunk_size).ok_or_else(too_large)
  }

  /// Store `data` and bind it to `part`, replacing any earlier upload for the
  /// same ordinal. The byte count must equal the part's expected size.
  pub async fn upload_part(
    &self,
    part: &UploadPart,
    token: LockToken,
    data: Bytes,
  ) -> Result<UploadPart> {
    let len = data.len() as u64;
    if len != part.expected_size {
      return Err(Error::invalid(
        "content",
        ValidationCode::FileSize,
        format!("part {} expects {} bytes, got {len}", part.ordinal, part.expected_size),
      ));
    }

    let key = self.blobs.write(data).await.map_err(Error::blob)?;
    match self.repo.bind_part(part.identity_id, part.id, token, key.clone()).await {
      Ok((bound, previous)) => {
        discard(self.blobs.as_ref(), previous).await;
        tracing::debug!(part = %bound.id, ordinal = bound.ordinal, len, "part uploaded");
        Ok(bound)
      }
      Err(e) => {
        discard(self.blobs.as_ref(), [key]).await;
        Err(Error::store(e))
      }
    }
  }

  /// Release the lock held by `token`. With parts open, all of them must be
  /// complete; they are concatenated in ordinal order and bound to the
  /// current revision.
  pub async fn finalize(&self, id: Uuid, token: LockToken) -> Result<Saved> {
    for attempt in 1..=FINALIZE_ATTEMPTS {
      let doc = self
        .repo
        .get_document(id)
        .await
        .map_err(Error::store)?
        .ok_or_else(|| Error::not_found("document", id))?;
      lock::check_holder(&doc.identity, &token)?;

      if doc.parts.is_empty() {
        return self.locks.release(id, token).await;
      }
      let keys: Vec<BlobKey> = doc.parts.iter().filter_map(|p| p.blob_key.clone()).collect();
      if keys.len() != doc.parts.len() {
        return Err(Conflict::IncompleteUpload.into());
      }

      let (key, size) = self.blobs.concat(&keys).await.map_err(Error::blob)?;
      match self
        .repo
        .finalize_upload(id, token.clone(), doc.parts, key.clone(), size)
        .await
      {
        Ok(saved) => {
          discard(self.blobs.as_ref(), saved.released.iter().cloned()).await;
          tracing::info!(%id, size, parts = keys.len(), "upload finalized");
          return Ok(saved);
        }
        Err(e) => {
          discard(self.blobs.as_ref(), [key]).await;
          let e = Error::store(e);
          let raced = matches!(e, Error::Conflict(Conflict::IncompleteUpload));
          if raced && attempt < FINALIZE_ATTEMPTS {
            tracing::warn!(%id, attempt, "parts changed during finalize, retrying");
            continue;
          }
          return Err(e);
        }
      }
    }
    Err(Conflict::IncompleteUpload.into())
  }
}
