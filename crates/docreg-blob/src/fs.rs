//! [`FsBlobStore`]: one file per blob under `root/<key[0..2]>/<key>`.
//!
//! Writes go to `root/.tmp/` first and are renamed into place, so a reader
//! never observes a partially written blob.

use std::{
  io,
  path::{Path, PathBuf},
};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use docreg_core::blob::{BlobEntry, BlobKey, BlobStore, BlobStream};
use tokio::{
  fs::{self, File},
  io::{AsyncReadExt as _, AsyncWriteExt as _},
};

use crate::{Error, Result, check_key, mint_key};

const TMP_DIR: &str = ".tmp";
const READ_CHUNK: usize = 64 * 1024;

/// A blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  /// Open (or create) a store rooted at `root`.
  pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
    let root = root.as_ref().to_path_buf();
    fs::create_dir_all(root.join(TMP_DIR)).await?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path { &self.root }

  fn path_of(&self, key: &BlobKey) -> PathBuf {
    let s = key.as_str();
    self.root.join(&s[..2]).join(s)
  }

  fn temp_path(&self) -> PathBuf {
    self.root.join(TMP_DIR).join(uuid::Uuid::new_v4().simple().to_string())
  }

  /// Move a finished temp file into its final place.
  async fn commit(&self, tmp: &Path, key: &BlobKey) -> Result<()> {
    let dest = self.path_of(key);
    if let Some(shard) = dest.parent() {
      fs::create_dir_all(shard).await?;
    }
    fs::rename(tmp, &dest).await?;
    Ok(())
  }

  async fn open_blob(&self, key: &BlobKey) -> Result<File> {
    check_key(key)?;
    File::open(self.path_of(key)).await.map_err(|e| not_found(e, key))
  }

  async fn concat_into(&self, tmp: &Path, keys: &[BlobKey]) -> Result<u64> {
    let mut out = File::create(tmp).await?;
    let mut total = 0_u64;
    for key in keys {
      let mut src = self.open_blob(key).await?;
      total += tokio::io::copy(&mut src, &mut out).await?;
    }
    out.flush().await?;
    out.sync_all().await?;
    Ok(total)
  }
}

fn not_found(e: io::Error, key: &BlobKey) -> Error {
  if e.kind() == io::ErrorKind::NotFound {
    Error::NotFound(key.clone())
  } else {
    Error::Io(e)
  }
}

fn is_shard(name: &str) -> bool {
  name.len() == 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

impl BlobStore for FsBlobStore {
  type Error = Error;

  async fn write(&self, data: Bytes) -> Result<BlobKey> {
    let key = mint_key();
    let tmp = self.temp_path();
    fs::write(&tmp, &data).await?;
    if let Err(e) = self.commit(&tmp, &key).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e);
    }
    tracing::debug!(%key, len = data.len(), "blob written");
    Ok(key)
  }

  async fn read<'a>(&'a self, key: &'a BlobKey) -> Result<BlobStream> {
    let file = self.open_blob(key).await?;
    let stream = futures::stream::try_unfold(file, |mut file| async move {
      let mut buf = BytesMut::with_capacity(READ_CHUNK);
      let n = file.read_buf(&mut buf).await?;
      if n == 0 {
        Ok::<_, io::Error>(None)
      } else {
        Ok(Some((buf.freeze(), file)))
      }
    });
    Ok(Box::pin(stream))
  }

  async fn size<'a>(&'a self, key: &'a BlobKey) -> Result<u64> {
    check_key(key)?;
    let meta = fs::metadata(self.path_of(key)).await.map_err(|e| not_found(e, key))?;
    Ok(meta.len())
  }

  async fn delete<'a>(&'a self, key: &'a BlobKey) -> Result<()> {
    check_key(key)?;
    match fs::remove_file(self.path_of(key)).await {
      Ok(()) => {
        tracing::debug!(%key, "blob deleted");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn concat<'a>(&'a self, keys: &'a [BlobKey]) -> Result<(BlobKey, u64)> {
    let key = mint_key();
    let tmp = self.temp_path();
    let total = match self.concat_into(&tmp, keys).await {
      Ok(total) => total,
      Err(e) => {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
      }
    };
    if let Err(e) = self.commit(&tmp, &key).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(e);
    }
    tracing::debug!(%key, parts = keys.len(), len = total, "blobs concatenated");
    Ok((key, total))
  }

  async fn list(&self) -> Result<Vec<BlobEntry>> {
    let mut entries = Vec::new();
    let mut shards = fs::read_dir(&self.root).await?;
    while let Some(shard) = shards.next_entry().await? {
      let is_dir = shard.file_type().await?.is_dir();
      if !is_dir || !shard.file_name().to_str().is_some_and(is_shard) {
        continue;
      }
      let mut files = fs::read_dir(shard.path()).await?;
      while let Some(file) = files.next_entry().await? {
        let Some(name) = file.file_name().to_str().map(str::to_owned) else {
          continue;
        };
        let key = BlobKey::new(name);
        if check_key(&key).is_err() {
          continue;
        }
        let meta = file.metadata().await?;
        let written_at: DateTime<Utc> = meta.modified()?.into();
        entries.push(BlobEntry { key, len: meta.len(), written_at });
      }
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
  }
}
