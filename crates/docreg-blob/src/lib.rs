//! Blob backends for the document registry.
//!
//! [`FsBlobStore`] keeps each blob in its own file under a sharded directory
//! tree; [`MemoryBlobStore`] keeps everything in a map and is meant for tests
//! and embedding.

mod fs;
mod memory;

pub mod error;

pub use error::{Error, Result};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

use docreg_core::blob::BlobKey;

/// Mint a fresh key: 32 lowercase hex digits.
pub(crate) fn mint_key() -> BlobKey {
  BlobKey::new(uuid::Uuid::new_v4().simple().to_string())
}

/// Reject keys this crate could not have minted, so a key can never name a
/// path outside the store.
pub(crate) fn check_key(key: &BlobKey) -> Result<()> {
  let s = key.as_str();
  if s.len() == 32 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
    Ok(())
  } else {
    Err(Error::InvalidKey(s.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minted_keys_pass_the_check() {
    for _ in 0..16 {
      assert!(check_key(&mint_key()).is_ok());
    }
  }

  #[test]
  fn traversal_keys_are_rejected() {
    for bad in ["../../etc/passwd", "", "ABCDEF0123456789ABCDEF0123456789", "x"] {
      assert!(matches!(check_key(&BlobKey::new(bad)), Err(Error::InvalidKey(_))));
    }
  }
}
