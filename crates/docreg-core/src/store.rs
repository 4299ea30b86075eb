//! The `Repository` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `docreg-store-sqlite`).
//! Higher layers (`docreg-registry`, `docreg-api`) depend on this abstraction,
//! not on any concrete backend.
//!
//! Every method that changes lock state is a single atomic transition: the
//! backend re-checks the lock token inside the same transaction that applies
//! the change, so two requests racing on one document cannot both succeed.

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  authz::Access,
  blob::BlobKey,
  document::{
    Confidentiality, Document, DocumentMetadata, DocumentRevision, LockToken,
    NewDocument, NewPart, UploadPart,
  },
  relation::{ObjectLink, Sending, SendingRole, UsageRight},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`Repository::current_documents`]. All set fields must
/// match; `access` is always applied.
#[derive(Debug, Clone)]
pub struct RevisionFilter {
  /// Restrict to these identities (bulk lookup).
  pub ids:                 Option<Vec<Uuid>>,
  pub business_id:         Option<String>,
  pub source_organization: Option<String>,
  pub document_type:       Option<String>,
  pub confidentiality:     Option<Confidentiality>,
  pub access:              Access,
  pub limit:               Option<usize>,
  pub offset:              Option<usize>,
}

impl RevisionFilter {
  pub fn new(access: Access) -> Self {
    Self {
      ids: None,
      business_id: None,
      source_organization: None,
      document_type: None,
      confidentiality: None,
      access,
      limit: None,
      offset: None,
    }
  }
}

/// Parameters for the relation listings. `object` is honoured by object links
/// only and `role` by sendings only.
#[derive(Debug, Clone)]
pub struct RelationFilter {
  pub identity_id: Option<Uuid>,
  pub object:      Option<String>,
  pub role:        Option<SendingRole>,
  pub access:      Access,
}

impl RelationFilter {
  pub fn new(access: Access) -> Self {
    Self { identity_id: None, object: None, role: None, access }
  }
}

/// One page of a listing plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub total: usize,
  pub items: Vec<T>,
}

// ─── Transition inputs and outputs ───────────────────────────────────────────

/// What to do with the upload parts when saving a working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartsChange {
  Keep,
  /// Drop existing parts and allocate these instead (empty clears them).
  Replace(Vec<NewPart>),
}

/// The new state of a working copy. Identity, version and `registered_at`
/// are never changed by an update.
#[derive(Debug, Clone)]
pub struct WorkingCopyUpdate {
  pub metadata:    DocumentMetadata,
  pub size:        Option<u64>,
  pub content_key: Option<BlobKey>,
  pub parts:       PartsChange,
}

/// How a lock is being released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unlock {
  /// Holder release; only valid with no open parts.
  Token(LockToken),
  /// Operator release: discard any parts and clear the token.
  Force,
}

/// Result of a transition that may orphan blobs.
#[derive(Debug, Clone)]
pub struct Saved {
  pub document: Document,
  /// Blob keys that no row references any more; safe to delete.
  pub released: Vec<BlobKey>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the registry's persistent state.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait Repository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Create an identity with its first revision (`version = 1`) and any
  /// parts. Generates `business_id` when empty; fails with `Unique` if the
  /// `(source_organization, business_id)` pair is taken.
  fn insert_document(
    &self,
    new: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// The identity, its current revision and its open parts.
  fn get_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn get_revision(
    &self,
    id: Uuid,
    version: u32,
  ) -> impl Future<Output = Result<Option<DocumentRevision>, Self::Error>> + Send + '_;

  /// The revision with the greatest `registered_at <= at`, ties broken by the
  /// higher version.
  fn revision_as_of(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<DocumentRevision>, Self::Error>> + Send + '_;

  /// Every revision of an identity, oldest first.
  fn list_revisions(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<DocumentRevision>, Self::Error>> + Send + '_;

  /// For each identity matching `filter`, exactly one entry: its current
  /// revision.
  fn current_documents<'a>(
    &'a self,
    filter: &'a RevisionFilter,
  ) -> impl Future<Output = Result<Page<Document>, Self::Error>> + Send + 'a;

  fn get_part(
    &self,
    part_id: Uuid,
  ) -> impl Future<Output = Result<Option<UploadPart>, Self::Error>> + Send + '_;

  /// The identity a part was allocated for, including parts already dropped
  /// by a commit, a forced unlock or a reallocation.
  fn part_owner(
    &self,
    part_id: Uuid,
  ) -> impl Future<Output = Result<Option<Uuid>, Self::Error>> + Send + '_;

  // ── Lock transitions ──────────────────────────────────────────────────

  /// Set `token` on an unlocked identity and clone its current revision into
  /// a working copy (`version + 1`). Fails with `ExistingLock` if locked, and
  /// with `FinalStatus` if the current revision is FINAL and `allow_final` is
  /// false.
  fn acquire_lock(
    &self,
    id: Uuid,
    token: LockToken,
    registered_at: DateTime<Utc>,
    allow_final: bool,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Replace the working copy in place. Fails with `Unlocked` or
  /// `IncorrectLockId` unless `token` holds the lock.
  fn save_working_copy(
    &self,
    id: Uuid,
    token: LockToken,
    update: WorkingCopyUpdate,
  ) -> impl Future<Output = Result<Saved, Self::Error>> + Send + '_;

  /// Bind an uploaded blob to a part of `id`, returning the part and the blob
  /// it previously held, if that blob is now unreferenced. The lock is checked
  /// before the part, so a write that lost the race with an unlock fails with
  /// `Unlocked` or `IncorrectLockId`.
  fn bind_part(
    &self,
    id: Uuid,
    part_id: Uuid,
    token: LockToken,
    key: BlobKey,
  ) -> impl Future<Output = Result<(UploadPart, Option<BlobKey>), Self::Error>> + Send + '_;

  /// Commit a chunked upload: bind `content_key` to the current revision,
  /// delete the parts and clear the lock. `expected` is the complete part set
  /// the caller concatenated; fails with `IncompleteUpload` if the stored parts
  /// differ from it.
  fn finalize_upload(
    &self,
    id: Uuid,
    token: LockToken,
    expected: Vec<UploadPart>,
    content_key: BlobKey,
    size: u64,
  ) -> impl Future<Output = Result<Saved, Self::Error>> + Send + '_;

  /// Clear the lock. A forced release discards parts and, if there were any,
  /// nulls the current revision's size. Forcing an unlocked identity is a
  /// no-op.
  fn release_lock(
    &self,
    id: Uuid,
    unlock: Unlock,
  ) -> impl Future<Output = Result<Saved, Self::Error>> + Send + '_;

  /// Remove the identity and everything it owns. Fails with
  /// `PendingRelations` while object links exist. Returns the blobs that are
  /// no longer referenced.
  fn delete_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<BlobKey>, Self::Error>> + Send + '_;

  /// Every blob key referenced by a revision or a part.
  fn referenced_blobs(
    &self,
  ) -> impl Future<Output = Result<HashSet<BlobKey>, Self::Error>> + Send + '_;

  // ── Usage rights ──────────────────────────────────────────────────────

  /// Insert; the first usage right of a document sets its current revision's
  /// indicator to `TRUE`.
  fn insert_usage_right(
    &self,
    right: UsageRight,
  ) -> impl Future<Output = Result<UsageRight, Self::Error>> + Send + '_;

  fn get_usage_right(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<UsageRight>, Self::Error>> + Send + '_;

  fn list_usage_rights<'a>(
    &'a self,
    filter: &'a RelationFilter,
  ) -> impl Future<Output = Result<Vec<UsageRight>, Self::Error>> + Send + 'a;

  fn update_usage_right(
    &self,
    right: UsageRight,
  ) -> impl Future<Output = Result<UsageRight, Self::Error>> + Send + '_;

  /// Delete; removing the last usage right resets the indicator to
  /// `UNKNOWN`.
  fn delete_usage_right(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Object links ──────────────────────────────────────────────────────

  /// Insert; fails with `Unique` if the document already links the URL.
  fn insert_object_link(
    &self,
    link: ObjectLink,
  ) -> impl Future<Output = Result<ObjectLink, Self::Error>> + Send + '_;

  fn get_object_link(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<ObjectLink>, Self::Error>> + Send + '_;

  fn list_object_links<'a>(
    &'a self,
    filter: &'a RelationFilter,
  ) -> impl Future<Output = Result<Vec<ObjectLink>, Self::Error>> + Send + 'a;

  fn delete_object_link(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Sendings ──────────────────────────────────────────────────────────

  fn insert_sending(
    &self,
    sending: Sending,
  ) -> impl Future<Output = Result<Sending, Self::Error>> + Send + '_;

  fn get_sending(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Sending>, Self::Error>> + Send + '_;

  fn list_sendings<'a>(
    &'a self,
    filter: &'a RelationFilter,
  ) -> impl Future<Output = Result<Vec<Sending>, Self::Error>> + Send + 'a;

  fn update_sending(
    &self,
    sending: Sending,
  ) -> impl Future<Output = Result<Sending, Self::Error>> + Send + '_;

  fn delete_sending(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
