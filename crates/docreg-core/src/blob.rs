//! The `BlobStore` trait: append-only binary storage for finalized document
//! bodies and upload parts.
//!
//! Blobs are named by opaque keys minted by the store on write. A blob is
//! never modified after it is written; replacing content means writing a new
//! blob and deleting the old one once nothing references it.

use std::{future::Future, io, pin::Pin};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

/// Opaque name of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for BlobKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// A listing entry, used by the janitor to find orphans.
#[derive(Debug, Clone)]
pub struct BlobEntry {
  pub key:        BlobKey,
  pub len:        u64,
  pub written_at: DateTime<Utc>,
}

/// A chunked byte stream over one blob.
pub type BlobStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Abstraction over a blob backend.
///
/// Writes are idempotent on their key: a key is only ever bound to one body.
pub trait BlobStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `data` under a freshly minted key.
  fn write(
    &self,
    data: Bytes,
  ) -> impl Future<Output = Result<BlobKey, Self::Error>> + Send + '_;

  /// Open a stream over the blob's bytes.
  fn read<'a>(
    &'a self,
    key: &'a BlobKey,
  ) -> impl Future<Output = Result<BlobStream, Self::Error>> + Send + 'a;

  /// Length of the blob in bytes.
  fn size<'a>(
    &'a self,
    key: &'a BlobKey,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Remove a blob. Deleting a missing key succeeds.
  fn delete<'a>(
    &'a self,
    key: &'a BlobKey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Concatenate `keys` in order into a new blob. Returns the new key and its
  /// total length; the sources are left untouched.
  fn concat<'a>(
    &'a self,
    keys: &'a [BlobKey],
  ) -> impl Future<Output = Result<(BlobKey, u64), Self::Error>> + Send + 'a;

  /// Every blob currently stored.
  fn list(
    &self,
  ) -> impl Future<Output = Result<Vec<BlobEntry>, Self::Error>> + Send + '_;
}
