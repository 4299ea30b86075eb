//! Service layer for the document registry.
//!
//! Everything here is generic over a [`Backend`], the bundle of a
//! [`Repository`], a [`BlobStore`] and the external resolvers, so the same
//! services run against SQLite and the filesystem in production and against
//! in-memory doubles in tests.
//!
//! Every operation takes the [`Caller`] it runs for; scopes and the
//! authorization filter are applied here, not at the HTTP boundary.

pub mod document;
pub mod error;
pub mod janitor;
pub mod lock;
pub mod relations;
pub mod retry;
pub mod upload;
pub mod version;


use std::{num::NonZeroU64, sync::Arc};

use docreg_core::{
  authz::{Caller, Scope},
  blob::{BlobKey, BlobStore},
  document::{Document, DocumentRevision},
  resolver::{DocumentTypeResolver, ObjectResolver},
  store::Repository,
};
use uuid::Uuid;

pub use document::{DocumentInput, DocumentService, ListQuery, UpdateMode};
pub use error::{Error, Result};
pub use janitor::Janitor;
pub use lock::LockManager;
pub use relations::RelationService;
pub use upload::UploadCoordinator;
pub use version::{Selector, VersionManager};

// ─── Backend ─────────────────────────────────────────────────────────────────

/// The concrete collaborators a registry runs on.
pub trait Backend: Send + Sync + 'static {
  type Repo: Repository + 'static;
  type Blobs: BlobStore + 'static;
  type Resolver: DocumentTypeResolver + ObjectResolver + 'static;
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// 10 MiB.
pub const DEFAULT_CHUNK_SIZE: NonZeroU64 = NonZeroU64::MIN.saturating_add(10 * 1024 * 1024 - 1);

/// Process-wide knobs, fixed at startup.
#[derive(Debug, Clone)]
pub struct Settings {
  /// Size of every upload part but the last.
  pub chunk_size:    NonZeroU64,
  /// Upper bound on the parts of one chunked upload.
  pub max_parts:     u32,
  /// Documents per list page.
  pub page_size:     usize,
  /// Minimum age of an unreferenced blob before the janitor removes it.
  pub janitor_grace: chrono::Duration,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      chunk_size:    DEFAULT_CHUNK_SIZE,
      max_parts:     10_000,
      page_size:     100,
      janitor_grace: chrono::Duration::days(1),
    }
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// All services, wired to one backend.
pub struct Registry<K: Backend> {
  pub documents: DocumentService<K>,
  pub relations: RelationService<K>,
  pub janitor:   Janitor<K>,
}

impl<K: Backend> Registry<K> {
  pub fn new(
    repo: Arc<K::Repo>,
    blobs: Arc<K::Blobs>,
    resolver: Arc<K::Resolver>,
    settings: Settings,
  ) -> Self {
    Self {
      documents: DocumentService::new(
        repo.clone(),
        blobs.clone(),
        resolver.clone(),
        &settings,
      ),
      relations: RelationService::new(repo.clone(), resolver),
      janitor:   Janitor::new(repo, blobs, settings.janitor_grace),
    }
  }
}

// ─── Shared guards ───────────────────────────────────────────────────────────

/// Fail with `Forbidden` unless some grant carries `scope`.
pub(crate) fn require_scope(caller: &Caller, scope: Scope) -> Result<()> {
  if caller.has_scope(scope) { Ok(()) } else { Err(Error::Forbidden) }
}

/// Fail with `Forbidden` unless `revision` is admitted for `scope`.
pub(crate) fn authorize(caller: &Caller, scope: Scope, revision: &DocumentRevision) -> Result<()> {
  let meta = &revision.metadata;
  if caller.access(scope).admits(&meta.document_type, meta.confidentiality) {
    Ok(())
  } else {
    Err(Error::Forbidden)
  }
}

/// Load a document and check `scope` against its current revision.
pub(crate) async fn admitted<R: Repository>(
  repo: &R,
  caller: &Caller,
  scope: Scope,
  id: Uuid,
) -> Result<Document> {
  require_scope(caller, scope)?;
  let doc = repo
    .get_document(id)
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::not_found("document", id))?;
  authorize(caller, scope, &doc.revision)?;
  Ok(doc)
}

/// Delete blobs nothing references any more. Failures are logged and left
/// for the janitor.
pub(crate) async fn discard<B: BlobStore>(blobs: &B, keys: impl IntoIterator<Item = BlobKey>) {
  for key in keys {
    if let Err(e) = blobs.delete(&key).await {
      tracing::warn!(%key, error = %e, "failed to delete released blob");
    }
  }
}
