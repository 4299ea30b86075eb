//! [`MemoryBlobStore`]: a map of blobs held in memory.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use docreg_core::blob::{BlobEntry, BlobKey, BlobStore, BlobStream};
use tokio::sync::RwLock;

use crate::{Error, Result, mint_key};

struct Stored {
  data:       Bytes,
  written_at: DateTime<Utc>,
}

/// In-memory blob store for tests and embedding. Reads clone the `Bytes`
/// handle, not the data.
#[derive(Default)]
pub struct MemoryBlobStore {
  blobs: RwLock<HashMap<BlobKey, Stored>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self { Self::default() }

  /// Number of blobs currently stored.
  pub async fn len(&self) -> usize { self.blobs.read().await.len() }

  pub async fn is_empty(&self) -> bool { self.blobs.read().await.is_empty() }

  pub async fn contains(&self, key: &BlobKey) -> bool {
    self.blobs.read().await.contains_key(key)
  }

  async fn insert(&self, data: Bytes) -> BlobKey {
    let key = mint_key();
    self
      .blobs
      .write()
      .await
      .insert(key.clone(), Stored { data, written_at: Utc::now() });
    key
  }
}

impl std::fmt::Debug for MemoryBlobStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemoryBlobStore").finish_non_exhaustive()
  }
}

impl BlobStore for MemoryBlobStore {
  type Error = Error;

  async fn write(&self, data: Bytes) -> Result<BlobKey> { Ok(self.insert(data).await) }

  async fn read<'a>(&'a self, key: &'a BlobKey) -> Result<BlobStream> {
    let data = self
      .blobs
      .read()
      .await
      .get(key)
      .map(|s| s.data.clone())
      .ok_or_else(|| Error::NotFound(key.clone()))?;
    Ok(Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(data) })))
  }

  async fn size<'a>(&'a self, key: &'a BlobKey) -> Result<u64> {
    self
      .blobs
      .read()
      .await
      .get(key)
      .map(|s| s.data.len() as u64)
      .ok_or_else(|| Error::NotFound(key.clone()))
  }

  async fn delete<'a>(&'a self, key: &'a BlobKey) -> Result<()> {
    self.blobs.write().await.remove(key);
    Ok(())
  }

  async fn concat<'a>(&'a self, keys: &'a [BlobKey]) -> Result<(BlobKey, u64)> {
    let joined = {
      let blobs = self.blobs.read().await;
      let mut buf = BytesMut::new();
      for key in keys {
        let stored = blobs.get(key).ok_or_else(|| Error::NotFound(key.clone()))?;
        buf.extend_from_slice(&stored.data);
      }
      buf.freeze()
    };
    let len = joined.len() as u64;
    Ok((self.insert(joined).await, len))
  }

  async fn list(&self) -> Result<Vec<BlobEntry>> {
    let mut entries: Vec<BlobEntry> = self
      .blobs
      .read()
      .await
      .iter()
      .map(|(key, s)| BlobEntry {
        key:        key.clone(),
        len:        s.data.len() as u64,
        written_at: s.written_at,
      })
      .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
  }
}

#[cfg(test)]
mod tests {
  use futures::TryStreamExt as _;

  use super::*;

  #[tokio::test]
  async fn concat_and_delete() {
    let store = MemoryBlobStore::new();
    let a = store.write(Bytes::from_static(b"abc")).await.unwrap();
    let b = store.write(Bytes::from_static(b"de")).await.unwrap();

    let (joined, len) = store.concat(&[a.clone(), b]).await.unwrap();
    assert_eq!(len, 5);
    let chunks: Vec<Bytes> = store.read(&joined).await.unwrap().try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"abcde");
    assert_eq!(store.len().await, 3);

    store.delete(&a).await.unwrap();
    assert!(!store.contains(&a).await);
    assert!(matches!(store.size(&a).await, Err(Error::NotFound(_))));
  }
}
