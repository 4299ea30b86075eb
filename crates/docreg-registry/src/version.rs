//! Revision selection: current, exact version, and point-in-time reads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docreg_core::{
  document::{Document, DocumentRevision},
  store::Repository,
};
use uuid::Uuid;

use crate::{Error, Result};

/// Which revision of a document to read. With both fields set the revision
/// must satisfy both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selector {
  pub version:                 Option<u32>,
  pub registered_at_or_before: Option<DateTime<Utc>>,
}

impl Selector {
  pub fn is_current(&self) -> bool {
    self.version.is_none() && self.registered_at_or_before.is_none()
  }
}

pub struct VersionManager<R> {
  repo: Arc<R>,
}

impl<R: Repository> VersionManager<R> {
  pub fn new(repo: Arc<R>) -> Self { Self { repo } }

  /// The identity with its highest revision.
  pub async fn current(&self, id: Uuid) -> Result<Document> {
    self
      .repo
      .get_document(id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("document", id))
  }

  pub async fn select(&self, id: Uuid, selector: Selector) -> Result<DocumentRevision> {
    let missing = || Error::not_found("revision", id);
    match (selector.version, selector.registered_at_or_before) {
      (None, None) => Ok(self.current(id).await?.revision),
      (Some(version), at) => {
        let revision = self
          .repo
          .get_revision(id, version)
          .await
          .map_err(Error::store)?
          .ok_or_else(missing)?;
        match at {
          Some(at) if revision.registered_at > at => Err(missing()),
          _ => Ok(revision),
        }
      }
      (None, Some(at)) => self
        .repo
        .revision_as_of(id, at)
        .await
        .map_err(Error::store)?
        .ok_or_else(missing),
    }
  }

  /// Every revision, oldest first.
  pub async fn history(&self, id: Uuid) -> Result<Vec<DocumentRevision>> {
    self.repo.list_revisions(id).await.map_err(Error::store)
  }

  /// The revision `revision` was cloned from, if any.
  pub async fn predecessor(&self, revision: &DocumentRevision) -> Result<Option<DocumentRevision>> {
    match revision.version.checked_sub(1) {
      Some(version) if version > 0 => self
        .repo
        .get_revision(revision.identity_id, version)
        .await
        .map_err(Error::store),
      _ => Ok(None),
    }
  }
}
