//! Document operations: create, read, update, delete, download, lock and
//! unlock, part upload, and the filtered listings.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use docreg_core::{
  Conflict,
  authz::{Caller, Scope},
  blob::{BlobKey, BlobStream, BlobStore},
  document::{
    Confidentiality, Document, DocumentMetadata, DocumentPatch, DocumentRevision, LockToken,
    NewDocument, Status, UploadPart,
  },
  resolver::{DocumentTypeInfo, DocumentTypeResolver},
  store::{Page, PartsChange, Repository, RevisionFilter, WorkingCopyUpdate},
  validation::{ValidationCode, ValidationErrors},
};
use uuid::Uuid;

use crate::{
  Backend, Error, LockManager, Result, Selector, Settings, UploadCoordinator, VersionManager,
  admitted, authorize, discard, lock, require_scope, retry,
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Metadata fields plus an optional body.
///
/// `content` is the decoded inline body. `size` without `content` announces
/// a chunked upload (or, for zero, an empty body).
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
  pub fields:  DocumentPatch,
  pub content: Option<Bytes>,
  pub size:    Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
  /// Full replacement: every required field must be present.
  Replace,
  Patch,
}

/// Filters for [`DocumentService::list`]. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
  pub business_id:         Option<String>,
  pub source_organization: Option<String>,
  pub document_type:       Option<String>,
  pub confidentiality:     Option<Confidentiality>,
  pub page:                Option<usize>,
}

/// What happens to a document's body.
enum Body {
  Inline(Bytes),
  Chunked(u64),
  Absent,
}

/// Decide the body change. Inline content and a declared size must agree.
fn plan(content: Option<Bytes>, size: Option<u64>) -> Result<Body> {
  match (content, size) {
    (Some(bytes), Some(size)) if size != bytes.len() as u64 => Err(Error::invalid(
      "size",
      ValidationCode::FileSize,
      format!("size is {size} but the content has {} bytes", bytes.len()),
    )),
    (Some(bytes), _) => Ok(Body::Inline(bytes)),
    (None, Some(0)) => Ok(Body::Inline(Bytes::new())),
    (None, Some(size)) => Ok(Body::Chunked(size)),
    (None, None) => Ok(Body::Absent),
  }
}

const REQUIRED: &str = "this field is required";

/// Required-field check for creates and full replacements.
fn missing_required(fields: &DocumentPatch) -> ValidationErrors {
  let mut errors = ValidationErrors::new();
  for (name, present) in [
    ("sourceOrganization", fields.source_organization.is_some()),
    ("creationDate", fields.creation_date.is_some()),
    ("title", fields.title.is_some()),
    ("author", fields.author.is_some()),
    ("language", fields.language.is_some()),
    ("documentType", fields.document_type.is_some()),
  ] {
    if !present {
      errors.push(name, ValidationCode::Required, REQUIRED);
    }
  }
  errors
}

/// Metadata for a new document from checked `fields`.
fn draft(f: DocumentPatch, info: &DocumentTypeInfo) -> DocumentMetadata {
  DocumentMetadata {
    source_organization:    f.source_organization.unwrap_or_default(),
    business_id:            f.business_id.unwrap_or_default(),
    creation_date:          f.creation_date.unwrap_or_default(),
    title:                  f.title.unwrap_or_default(),
    confidentiality:        f.confidentiality.unwrap_or(info.default_confidentiality),
    author:                 f.author.unwrap_or_default(),
    status:                 f.status.flatten(),
    description:            f.description.unwrap_or_default(),
    received_on:            f.received_on.flatten(),
    sent_on:                f.sent_on.flatten(),
    usage_rights_indicator: f.usage_rights_indicator.unwrap_or_default(),
    format:                 f.format.unwrap_or_default(),
    language:               f.language.unwrap_or_default(),
    filename:               f.filename.unwrap_or_default(),
    external_link:          f.external_link.flatten(),
    document_type:          f.document_type.unwrap_or_default(),
    integrity:              f.integrity.flatten(),
    signing:                f.signing.flatten(),
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct DocumentService<K: Backend> {
  repo:      Arc<K::Repo>,
  blobs:     Arc<K::Blobs>,
  types:     Arc<K::Resolver>,
  versions:  VersionManager<K::Repo>,
  locks:     LockManager<K::Repo>,
  uploads:   UploadCoordinator<K::Repo, K::Blobs>,
  page_size: usize,
}

impl<K: Backend> DocumentService<K> {
  pub fn new(
    repo: Arc<K::Repo>,
    blobs: Arc<K::Blobs>,
    types: Arc<K::Resolver>,
    settings: &Settings,
  ) -> Self {
    Self {
      versions: VersionManager::new(repo.clone()),
      locks: LockManager::new(repo.clone()),
      uploads: UploadCoordinator::new(
        repo.clone(),
        blobs.clone(),
        settings.chunk_size,
        settings.max_parts,
      ),
      page_size: settings.page_size.max(1),
      repo,
      blobs,
      types,
    }
  }

  pub fn page_size(&self) -> usize { self.page_size }

  async fn document_type(&self, url: &str) -> Result<DocumentTypeInfo> {
    let types = self.types.as_ref();
    let info = retry::once(move || types.document_type(url))
      .await
      .map_err(|e| Error::resolve("documentType", e))?;
    if !info.published {
      return Err(Error::invalid(
        "documentType",
        ValidationCode::NotPublished,
        format!("document type {url} is not published"),
      ));
    }
    Ok(info)
  }

  async fn store_inline(&self, bytes: Bytes) -> Result<(BlobKey, u64)> {
    let len = bytes.len() as u64;
    let key = self.blobs.write(bytes).await.map_err(Error::blob)?;
    Ok((key, len))
  }

  /// FINAL documents, and working copies cloned from one, are frozen unless
  /// the caller may override.
  async fn check_final(&self, caller: &Caller, current: &DocumentRevision) -> Result<()> {
    if authorize(caller, Scope::ForceUnlock, current).is_ok() {
      return Ok(());
    }
    let is_final = |r: &DocumentRevision| r.metadata.status == Some(Status::Final);
    if is_final(current) {
      return Err(Conflict::FinalStatus.into());
    }
    if let Some(previous) = self.versions.predecessor(current).await?
      && is_final(&previous)
    {
      return Err(Conflict::FinalStatus.into());
    }
    Ok(())
  }

  // ── Create ────────────────────────────────────────────────────────────

  /// Create a document at version 1. A declared size without content opens
  /// a chunked upload: the document comes back locked with its parts.
  pub async fn create(&self, caller: &Caller, input: DocumentInput) -> Result<Document> {
    require_scope(caller, Scope::Create)?;
    missing_required(&input.fields).into_result()?;

    let document_type = input.fields.document_type.clone().unwrap_or_default();
    let info = self.document_type(&document_type).await?;
    let metadata = draft(input.fields, &info);
    metadata.validate()?;
    authorize_metadata(caller, Scope::Create, &metadata)?;

    let (content_key, size, parts, lock_token) = match plan(input.content, input.size)? {
      Body::Inline(bytes) => {
        let (key, len) = self.store_inline(bytes).await?;
        (Some(key), Some(len), Vec::new(), None)
      }
      Body::Chunked(size) => {
        let parts = self.uploads.allocate(size)?;
        (None, Some(size), parts, Some(lock::mint_token()))
      }
      Body::Absent => (None, None, Vec::new(), None),
    };

    let new = NewDocument {
      metadata,
      size,
      content_key: content_key.clone(),
      parts,
      lock_token,
      registered_at: Utc::now(),
    };
    match self.repo.insert_document(new).await {
      Ok(doc) => {
        tracing::info!(
          id = %doc.identity.id,
          parts = doc.parts.len(),
          "document created"
        );
        Ok(doc)
      }
      Err(e) => {
        discard(self.blobs.as_ref(), content_key).await;
        Err(Error::store(e))
      }
    }
  }

  // ── Read ──────────────────────────────────────────────────────────────

  /// The selected revision. Authorization is decided on the current one.
  /// Parts are only reported alongside the current revision.
  pub async fn read(&self, caller: &Caller, id: Uuid, selector: Selector) -> Result<Document> {
    let mut doc = admitted(self.repo.as_ref(), caller, Scope::Read, id).await?;
    if !selector.is_current() {
      let revision = self.versions.select(id, selector).await?;
      if revision.version != doc.revision.version {
        doc.parts.clear();
      }
      doc.revision = revision;
    }
    Ok(doc)
  }

  /// Every revision, oldest first.
  pub async fn versions(&self, caller: &Caller, id: Uuid) -> Result<Vec<DocumentRevision>> {
    admitted(self.repo.as_ref(), caller, Scope::Read, id).await?;
    self.versions.history(id).await
  }

  /// The body of the selected revision.
  pub async fn download(
    &self,
    caller: &Caller,
    id: Uuid,
    selector: Selector,
  ) -> Result<(DocumentRevision, BlobStream)> {
    let doc = self.read(caller, id, selector).await?;
    let Some(key) = doc.revision.content_key.clone() else {
      return Err(Error::NoContent);
    };
    let stream = self.blobs.read(&key).await.map_err(Error::blob)?;
    Ok((doc.revision, stream))
  }

  pub async fn list(&self, caller: &Caller, query: ListQuery) -> Result<Page<Document>> {
    require_scope(caller, Scope::Read)?;
    let page = query.page.unwrap_or(1);
    if page == 0 {
      return Err(Error::invalid("page", ValidationCode::Invalid, "pages start at 1"));
    }
    let mut filter = RevisionFilter::new(caller.access(Scope::Read));
    filter.business_id = query.business_id;
    filter.source_organization = query.source_organization;
    filter.document_type = query.document_type;
    filter.confidentiality = query.confidentiality;
    let offset = (page - 1)
      .checked_mul(self.page_size)
      .ok_or_else(|| Error::invalid("page", ValidationCode::Invalid, "page is out of range"))?;
    filter.limit = Some(self.page_size);
    filter.offset = Some(offset);
    self.repo.current_documents(&filter).await.map_err(Error::store)
  }

  /// Current revisions of the given identities that the caller may read.
  /// Unknown and filtered ids are left out.
  pub async fn search_by_ids(&self, caller: &Caller, ids: Vec<Uuid>) -> Result<Vec<Document>> {
    require_scope(caller, Scope::Read)?;
    let mut filter = RevisionFilter::new(caller.access(Scope::Read));
    filter.ids = Some(ids);
    let page = self.repo.current_documents(&filter).await.map_err(Error::store)?;
    Ok(page.items)
  }

  // ── Update ────────────────────────────────────────────────────────────

  /// Change the working copy held by `token`. New inline content replaces
  /// the body; a changed size without content reallocates the parts.
  pub async fn update(
    &self,
    caller: &Caller,
    id: Uuid,
    token: LockToken,
    input: DocumentInput,
    mode: UpdateMode,
  ) -> Result<Document> {
    let doc = admitted(self.repo.as_ref(), caller, Scope::Update, id).await?;
    self.check_final(caller, &doc.revision).await?;
    lock::check_holder(&doc.identity, &token)?;
    if mode == UpdateMode::Replace {
      missing_required(&input.fields).into_result()?;
    }

    let mut metadata = doc.revision.metadata.clone();
    input.fields.apply(&mut metadata)?;
    metadata.validate()?;
    authorize_metadata(caller, Scope::Update, &metadata)?;

    let mut written = None;
    let update = match plan(input.content, input.size)? {
      Body::Inline(bytes) => {
        let (key, len) = self.store_inline(bytes).await?;
        written = Some(key.clone());
        WorkingCopyUpdate {
          metadata,
          size: Some(len),
          content_key: Some(key),
          parts: PartsChange::Replace(Vec::new()),
        }
      }
      Body::Chunked(size) if Some(size) != doc.revision.size => WorkingCopyUpdate {
        metadata,
        size: Some(size),
        content_key: None,
        parts: PartsChange::Replace(self.uploads.allocate(size)?),
      },
      Body::Chunked(_) | Body::Absent => WorkingCopyUpdate {
        metadata,
        size: doc.revision.size,
        content_key: doc.revision.content_key.clone(),
        parts: PartsChange::Keep,
      },
    };

    match self.repo.save_working_copy(id, token, update).await {
      Ok(saved) => {
        discard(self.blobs.as_ref(), saved.released).await;
        tracing::info!(%id, version = saved.document.revision.version, "working copy updated");
        Ok(saved.document)
      }
      Err(e) => {
        discard(self.blobs.as_ref(), written).await;
        Err(Error::store(e))
      }
    }
  }

  // ── Delete ────────────────────────────────────────────────────────────

  /// Remove the document with everything it owns.
  pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<()> {
    admitted(self.repo.as_ref(), caller, Scope::Delete, id).await?;
    let released = self.repo.delete_document(id).await.map_err(Error::store)?;
    tracing::info!(%id, blobs = released.len(), "document deleted");
    discard(self.blobs.as_ref(), released).await;
    Ok(())
  }

  // ── Locking ───────────────────────────────────────────────────────────

  /// Lock and open a working copy; returns it with the new token.
  pub async fn lock(&self, caller: &Caller, id: Uuid) -> Result<Document> {
    let doc = admitted(self.repo.as_ref(), caller, Scope::Lock, id).await?;
    let allow_final = authorize(caller, Scope::ForceUnlock, &doc.revision).is_ok();
    self.locks.lock(id, allow_final).await
  }

  /// Release the lock. Without `force` this commits any chunked upload;
  /// with it any upload in progress is abandoned. A missing token counts as
  /// `force` only for callers allowed to force; anyone else gets the holder
  /// check (`incorrect-lock-id`, or `unlocked` on an unlocked document).
  pub async fn unlock(
    &self,
    caller: &Caller,
    id: Uuid,
    token: Option<LockToken>,
    force: bool,
  ) -> Result<Document> {
    match (token, force) {
      (Some(token), false) => {
        admitted(self.repo.as_ref(), caller, Scope::Lock, id).await?;
        Ok(self.uploads.finalize(id, token).await?.document)
      }
      (None, false) => match self.force_unlock(caller, id).await {
        Err(Error::Forbidden) => {
          let doc = admitted(self.repo.as_ref(), caller, Scope::Lock, id).await?;
          let conflict = if doc.identity.is_locked() {
            Conflict::IncorrectLockId
          } else {
            Conflict::Unlocked
          };
          Err(conflict.into())
        }
        forced => forced,
      },
      (_, true) => self.force_unlock(caller, id).await,
    }
  }

  async fn force_unlock(&self, caller: &Caller, id: Uuid) -> Result<Document> {
    admitted(self.repo.as_ref(), caller, Scope::ForceUnlock, id).await?;
    let saved = self.locks.force(id).await?;
    discard(self.blobs.as_ref(), saved.released).await;
    Ok(saved.document)
  }

  // ── Parts ─────────────────────────────────────────────────────────────

  pub async fn get_part(&self, caller: &Caller, part_id: Uuid) -> Result<UploadPart> {
    let part = self.find_part(part_id).await?;
    admitted(self.repo.as_ref(), caller, Scope::Read, part.identity_id).await?;
    Ok(part)
  }

  /// Upload the bytes of one part under the document's lock. Parts dropped
  /// by an unlock report the lock state of their document.
  pub async fn upload_part(
    &self,
    caller: &Caller,
    part_id: Uuid,
    token: LockToken,
    data: Bytes,
  ) -> Result<UploadPart> {
    require_scope(caller, Scope::Update)?;
    let owner = self
      .repo
      .part_owner(part_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("part", part_id))?;
    let doc = admitted(self.repo.as_ref(), caller, Scope::Update, owner).await?;
    lock::check_holder(&doc.identity, &token)?;
    let part = self.find_part(part_id).await?;
    self.uploads.upload_part(&part, token, data).await
  }

  async fn find_part(&self, part_id: Uuid) -> Result<UploadPart> {
    self
      .repo
      .get_part(part_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::not_found("part", part_id))
  }
}

fn authorize_metadata(caller: &Caller, scope: Scope, meta: &DocumentMetadata) -> Result<()> {
  if caller.access(scope).admits(&meta.document_type, meta.confidentiality) {
    Ok(())
  } else {
    Err(Error::Forbidden)
  }
}
