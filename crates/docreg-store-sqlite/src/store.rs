//! [`SqliteStore`]: the SQLite implementation of [`Repository`].

use std::{collections::HashSet, path::Path};

use chrono::{DateTime, Utc};
use docreg_core::{
  blob::BlobKey,
  document::{Document, DocumentRevision, LockToken, NewDocument, UploadPart},
  relation::{ObjectLink, Sending, UsageRight},
  store::{Page, RelationFilter, Repository, RevisionFilter, Saved, Unlock, WorkingCopyUpdate},
};
use uuid::Uuid;

use crate::{Result, documents, relations, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A document registry store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the database thread. `f` carries its own error type so domain
  /// failures raised inside a transaction survive the trip back.
  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

// ─── Repository impl ─────────────────────────────────────────────────────────

impl Repository for SqliteStore {
  type Error = crate::Error;

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn insert_document(&self, new: NewDocument) -> Result<Document> {
    let document = self.run(move |conn| documents::insert_document(conn, new)).await?;
    tracing::debug!(id = %document.identity.id, "document inserted");
    Ok(document)
  }

  async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
    self.run(move |conn| documents::get_document(conn, id)).await
  }

  async fn get_revision(&self, id: Uuid, version: u32) -> Result<Option<DocumentRevision>> {
    self.run(move |conn| documents::get_revision(conn, id, version)).await
  }

  async fn revision_as_of(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<Option<DocumentRevision>> {
    self.run(move |conn| documents::revision_as_of(conn, id, at)).await
  }

  async fn list_revisions(&self, id: Uuid) -> Result<Vec<DocumentRevision>> {
    self.run(move |conn| documents::list_revisions(conn, id)).await
  }

  async fn current_documents<'a>(&'a self, filter: &'a RevisionFilter) -> Result<Page<Document>> {
    let filter = filter.clone();
    self.run(move |conn| documents::current_documents(conn, &filter)).await
  }

  async fn get_part(&self, part_id: Uuid) -> Result<Option<UploadPart>> {
    self.run(move |conn| documents::get_part(conn, part_id)).await
  }

  async fn part_owner(&self, part_id: Uuid) -> Result<Option<Uuid>> {
    self.run(move |conn| documents::part_owner(conn, part_id)).await
  }

  // ── Lock transitions ──────────────────────────────────────────────────────

  async fn acquire_lock(
    &self,
    id: Uuid,
    token: LockToken,
    registered_at: DateTime<Utc>,
    allow_final: bool,
  ) -> Result<Document> {
    self
      .run(move |conn| documents::acquire_lock(conn, id, token, registered_at, allow_final))
      .await
  }

  async fn save_working_copy(
    &self,
    id: Uuid,
    token: LockToken,
    update: WorkingCopyUpdate,
  ) -> Result<Saved> {
    self.run(move |conn| documents::save_working_copy(conn, id, token, update)).await
  }

  async fn bind_part(
    &self,
    id: Uuid,
    part_id: Uuid,
    token: LockToken,
    key: BlobKey,
  ) -> Result<(UploadPart, Option<BlobKey>)> {
    self.run(move |conn| documents::bind_part(conn, id, part_id, token, key)).await
  }

  async fn finalize_upload(
    &self,
    id: Uuid,
    token: LockToken,
    expected: Vec<UploadPart>,
    content_key: BlobKey,
    size: u64,
  ) -> Result<Saved> {
    self
      .run(move |conn| documents::finalize_upload(conn, id, token, expected, content_key, size))
      .await
  }

  async fn release_lock(&self, id: Uuid, unlock: Unlock) -> Result<Saved> {
    self.run(move |conn| documents::release_lock(conn, id, unlock)).await
  }

  async fn delete_document(&self, id: Uuid) -> Result<Vec<BlobKey>> {
    self.run(move |conn| documents::delete_document(conn, id)).await
  }

  async fn referenced_blobs(&self) -> Result<HashSet<BlobKey>> {
    self.run(|conn| documents::referenced_blobs(conn)).await
  }

  // ── Usage rights ──────────────────────────────────────────────────────────

  async fn insert_usage_right(&self, right: UsageRight) -> Result<UsageRight> {
    self.run(move |conn| relations::insert_usage_right(conn, right)).await
  }

  async fn get_usage_right(&self, id: Uuid) -> Result<Option<UsageRight>> {
    self.run(move |conn| relations::get_usage_right(conn, id)).await
  }

  async fn list_usage_rights<'a>(&'a self, filter: &'a RelationFilter) -> Result<Vec<UsageRight>> {
    let filter = filter.clone();
    self.run(move |conn| relations::list_usage_rights(conn, &filter)).await
  }

  async fn update_usage_right(&self, right: UsageRight) -> Result<UsageRight> {
    self.run(move |conn| relations::update_usage_right(conn, right)).await
  }

  async fn delete_usage_right(&self, id: Uuid) -> Result<()> {
    self.run(move |conn| relations::delete_usage_right(conn, id)).await
  }

  // ── Object links ──────────────────────────────────────────────────────────

  async fn insert_object_link(&self, link: ObjectLink) -> Result<ObjectLink> {
    self.run(move |conn| relations::insert_object_link(conn, link)).await
  }

  async fn get_object_link(&self, id: Uuid) -> Result<Option<ObjectLink>> {
    self.run(move |conn| relations::get_object_link(conn, id)).await
  }

  async fn list_object_links<'a>(&'a self, filter: &'a RelationFilter) -> Result<Vec<ObjectLink>> {
    let filter = filter.clone();
    self.run(move |conn| relations::list_object_links(conn, &filter)).await
  }

  async fn delete_object_link(&self, id: Uuid) -> Result<()> {
    self.run(move |conn| relations::delete_object_link(conn, id)).await
  }

  // ── Sendings ──────────────────────────────────────────────────────────────

  async fn insert_sending(&self, sending: Sending) -> Result<Sending> {
    self.run(move |conn| relations::insert_sending(conn, sending)).await
  }

  async fn get_sending(&self, id: Uuid) -> Result<Option<Sending>> {
    self.run(move |conn| relations::get_sending(conn, id)).await
  }

  async fn list_sendings<'a>(&'a self, filter: &'a RelationFilter) -> Result<Vec<Sending>> {
    let filter = filter.clone();
    self.run(move |conn| relations::list_sendings(conn, &filter)).await
  }

  async fn update_sending(&self, sending: Sending) -> Result<Sending> {
    self.run(move |conn| relations::update_sending(conn, sending)).await
  }

  async fn delete_sending(&self, id: Uuid) -> Result<()> {
    self.run(move |conn| relations::delete_sending(conn, id)).await
  }
}
