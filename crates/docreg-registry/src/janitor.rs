//! Background removal of blobs no row references.
//!
//! Blob writes happen outside the transactions that bind them, so a rolled
//! back transaction or a crash can leave a blob behind. The janitor deletes
//! those once they are older than a grace period; younger blobs may belong to
//! a request that has not committed yet.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use docreg_core::{blob::BlobStore, store::Repository};

use crate::{Backend, Error, Result};

pub struct Janitor<K: Backend> {
  repo:  Arc<K::Repo>,
  blobs: Arc<K::Blobs>,
  grace: chrono::Duration,
}

impl<K: Backend> Janitor<K> {
  pub fn new(repo: Arc<K::Repo>, blobs: Arc<K::Blobs>, grace: chrono::Duration) -> Self {
    Self { repo, blobs, grace }
  }

  /// One pass as of `now`. Returns how many blobs were removed.
  pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
    // List before reading references: a blob bound in between is then seen
    // as referenced.
    let entries = self.blobs.list().await.map_err(Error::blob)?;
    let referenced = self.repo.referenced_blobs().await.map_err(Error::store)?;

    let mut removed = 0;
    for entry in entries {
      if referenced.contains(&entry.key) || now - entry.written_at < self.grace {
        continue;
      }
      match self.blobs.delete(&entry.key).await {
        Ok(()) => removed += 1,
        Err(e) => tracing::warn!(key = %entry.key, error = %e, "janitor failed to delete blob"),
      }
    }
    Ok(removed)
  }

  pub async fn sweep(&self) -> Result<usize> { self.sweep_at(Utc::now()).await }

  /// Sweep every `interval`, forever.
  pub async fn run(&self, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match self.sweep().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "janitor removed unreferenced blobs"),
        Err(e) => tracing::warn!(error = %e, "janitor sweep failed"),
      }
    }
  }
}
