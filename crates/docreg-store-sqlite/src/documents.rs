//! Synchronous document transactions, run on the `tokio_rusqlite` thread.
//!
//! Each public function is one transaction. Domain failures (missing rows,
//! lock conflicts, uniqueness) are returned as [`Error::Core`] and roll the
//! transaction back by dropping it.

use std::collections::HashSet;

use chrono::{DateTime, Datelike as _, Utc};
use docreg_core::{
  Conflict,
  blob::BlobKey,
  document::{
    Document, DocumentIdentity, DocumentMetadata, DocumentRevision, LockToken,
    NewDocument, NewPart, Status, UploadPart,
  },
  store::{Page, PartsChange, RevisionFilter, Saved, Unlock, WorkingCopyUpdate},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    IDENTITY_COLUMNS, PART_COLUMNS, REVISION_COLUMNS, RawIdentity, RawPart, RawRevision,
    decode_uuid, encode_confidentiality, encode_dt, encode_metadata, encode_u64, encode_uuid,
  },
  error::unique_on,
  query::Conditions,
};

fn not_found(id: Uuid) -> Error { docreg_core::Error::not_found("document", id).into() }

// ─── Row helpers ─────────────────────────────────────────────────────────────

pub(crate) fn identity(conn: &Connection, id: Uuid) -> Result<Option<DocumentIdentity>> {
  let raw = conn
    .query_row(
      &format!("SELECT {IDENTITY_COLUMNS} FROM identities i WHERE i.identity_id = ?1"),
      [encode_uuid(id)],
      |row| RawIdentity::from_row(row, 0),
    )
    .optional()?;
  raw.map(RawIdentity::into_identity).transpose()
}

pub(crate) fn current_revision(conn: &Connection, id: Uuid) -> Result<Option<DocumentRevision>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {REVISION_COLUMNS} FROM current_revisions r WHERE r.identity_id = ?1"
      ),
      [encode_uuid(id)],
      |row| RawRevision::from_row(row, 0),
    )
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

pub(crate) fn parts_of(conn: &Connection, id: Uuid) -> Result<Vec<UploadPart>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PART_COLUMNS} FROM parts p WHERE p.identity_id = ?1 ORDER BY p.ordinal"
  ))?;
  let raws = stmt
    .query_map([encode_uuid(id)], RawPart::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPart::into_part).collect()
}

fn part(conn: &Connection, part_id: Uuid) -> Result<Option<UploadPart>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PART_COLUMNS} FROM parts p WHERE p.part_id = ?1"),
      [encode_uuid(part_id)],
      RawPart::from_row,
    )
    .optional()?;
  raw.map(RawPart::into_part).transpose()
}

fn insert_revision(conn: &Connection, rev: &DocumentRevision) -> Result<()> {
  conn.execute(
    "INSERT INTO revisions (
       revision_id, identity_id, version, registered_at, document_type,
       confidentiality, status, metadata_json, size, content_key
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      encode_uuid(rev.revision_id),
      encode_uuid(rev.identity_id),
      i64::from(rev.version),
      encode_dt(rev.registered_at),
      rev.metadata.document_type,
      encode_confidentiality(rev.metadata.confidentiality),
      rev.metadata.status.map(|s| s.as_ref().to_owned()),
      encode_metadata(&rev.metadata)?,
      rev.size.map(encode_u64).transpose()?,
      rev.content_key.as_ref().map(BlobKey::as_str),
    ],
  )?;
  Ok(())
}

fn update_revision(conn: &Connection, rev: &DocumentRevision) -> Result<()> {
  conn.execute(
    "UPDATE revisions SET
       confidentiality = ?2, status = ?3, metadata_json = ?4, size = ?5,
       content_key = ?6
     WHERE revision_id = ?1",
    rusqlite::params![
      encode_uuid(rev.revision_id),
      encode_confidentiality(rev.metadata.confidentiality),
      rev.metadata.status.map(|s| s.as_ref().to_owned()),
      encode_metadata(&rev.metadata)?,
      rev.size.map(encode_u64).transpose()?,
      rev.content_key.as_ref().map(BlobKey::as_str),
    ],
  )?;
  Ok(())
}

fn insert_parts(
  conn: &Connection,
  identity_id: Uuid,
  parts: &[NewPart],
) -> Result<Vec<UploadPart>> {
  let mut stmt = conn.prepare(
    "INSERT INTO parts (part_id, identity_id, ordinal, expected_size, blob_key)
     VALUES (?1, ?2, ?3, ?4, NULL)",
  )?;
  let mut out = Vec::with_capacity(parts.len());
  for p in parts {
    let part = UploadPart {
      id: Uuid::new_v4(),
      identity_id,
      ordinal: p.ordinal,
      expected_size: p.expected_size,
      blob_key: None,
    };
    stmt.execute(rusqlite::params![
      encode_uuid(part.id),
      encode_uuid(identity_id),
      i64::from(part.ordinal),
      encode_u64(part.expected_size)?,
    ])?;
    out.push(part);
  }
  Ok(out)
}

fn set_lock_token(conn: &Connection, id: Uuid, token: Option<&LockToken>) -> Result<()> {
  conn.execute(
    "UPDATE identities SET lock_token = ?2 WHERE identity_id = ?1",
    rusqlite::params![encode_uuid(id), token.map(LockToken::as_str)],
  )?;
  Ok(())
}

/// `DOCUMENT-<year>-<n:010>`, one past the highest generated number for the
/// organisation and year.
fn next_business_id(conn: &Connection, source_organization: &str, year: i32) -> Result<String> {
  let prefix = format!("DOCUMENT-{year}-");
  let last: Option<String> = conn
    .query_row(
      "SELECT business_id FROM identities
       WHERE source_organization = ?1 AND substr(business_id, 1, ?2) = ?3
       ORDER BY business_id DESC LIMIT 1",
      rusqlite::params![source_organization, prefix.len() as i64, prefix],
      |row| row.get(0),
    )
    .optional()?;
  let n = last
    .as_deref()
    .and_then(|s| s.strip_prefix(&prefix))
    .and_then(|n| n.parse::<u64>().ok())
    .unwrap_or(0);
  Ok(format!("{prefix}{:010}", n + 1))
}

fn set_business_key(conn: &Connection, id: Uuid, meta: &DocumentMetadata) -> Result<()> {
  conn
    .execute(
      "UPDATE identities SET source_organization = ?2, business_id = ?3
       WHERE identity_id = ?1",
      rusqlite::params![encode_uuid(id), meta.source_organization, meta.business_id],
    )
    .map_err(unique_on("businessId"))?;
  Ok(())
}

/// The subset of `candidates` that no revision or part references any more.
pub(crate) fn orphaned(conn: &Connection, candidates: Vec<BlobKey>) -> Result<Vec<BlobKey>> {
  let mut stmt = conn.prepare(
    "SELECT EXISTS (SELECT 1 FROM revisions WHERE content_key = ?1)
         OR EXISTS (SELECT 1 FROM parts WHERE blob_key = ?1)",
  )?;
  let mut seen = HashSet::new();
  let mut out = Vec::new();
  for key in candidates {
    if !seen.insert(key.clone()) {
      continue;
    }
    let referenced: bool = stmt.query_row([key.as_str()], |row| row.get(0))?;
    if !referenced {
      out.push(key);
    }
  }
  Ok(out)
}

fn check_token(identity: &DocumentIdentity, token: &LockToken) -> Result<()> {
  match &identity.lock_token {
    None => Err(Conflict::Unlocked.into()),
    Some(held) if held != token => Err(Conflict::IncorrectLockId.into()),
    Some(_) => Ok(()),
  }
}

/// Move the identity's parts to `retired_parts`.
fn retire_parts(conn: &Connection, id: Uuid) -> Result<()> {
  let id = encode_uuid(id);
  conn.execute(
    "INSERT OR IGNORE INTO retired_parts (part_id, identity_id)
     SELECT part_id, identity_id FROM parts WHERE identity_id = ?1",
    [&id],
  )?;
  conn.execute("DELETE FROM parts WHERE identity_id = ?1", [&id])?;
  Ok(())
}

fn part_keys(parts: &[UploadPart]) -> impl Iterator<Item = BlobKey> + '_ {
  parts.iter().filter_map(|p| p.blob_key.clone())
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn get_document(conn: &Connection, id: Uuid) -> Result<Option<Document>> {
  let Some(identity) = identity(conn, id)? else {
    return Ok(None);
  };
  let revision = current_revision(conn, id)?.ok_or_else(|| not_found(id))?;
  let parts = parts_of(conn, id)?;
  Ok(Some(Document { identity, revision, parts }))
}

pub fn get_revision(conn: &Connection, id: Uuid, version: u32) -> Result<Option<DocumentRevision>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {REVISION_COLUMNS} FROM revisions r
         WHERE r.identity_id = ?1 AND r.version = ?2"
      ),
      rusqlite::params![encode_uuid(id), i64::from(version)],
      |row| RawRevision::from_row(row, 0),
    )
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

pub fn revision_as_of(
  conn: &Connection,
  id: Uuid,
  at: DateTime<Utc>,
) -> Result<Option<DocumentRevision>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {REVISION_COLUMNS} FROM revisions r
         WHERE r.identity_id = ?1 AND r.registered_at <= ?2
         ORDER BY r.registered_at DESC, r.version DESC
         LIMIT 1"
      ),
      rusqlite::params![encode_uuid(id), encode_dt(at)],
      |row| RawRevision::from_row(row, 0),
    )
    .optional()?;
  raw.map(RawRevision::into_revision).transpose()
}

pub fn list_revisions(conn: &Connection, id: Uuid) -> Result<Vec<DocumentRevision>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {REVISION_COLUMNS} FROM revisions r WHERE r.identity_id = ?1 ORDER BY r.version"
  ))?;
  let raws = stmt
    .query_map([encode_uuid(id)], |row| RawRevision::from_row(row, 0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawRevision::into_revision).collect()
}

pub fn current_documents(conn: &Connection, filter: &RevisionFilter) -> Result<Page<Document>> {
  let mut conds = Conditions::new();
  if let Some(ids) = &filter.ids {
    conds.push_in(
      "i.identity_id",
      ids.iter().map(|id| Value::Text(encode_uuid(*id))).collect(),
    );
  }
  if let Some(business_id) = &filter.business_id {
    conds.push("i.business_id = ?", business_id.clone());
  }
  if let Some(org) = &filter.source_organization {
    conds.push("i.source_organization = ?", org.clone());
  }
  if let Some(document_type) = &filter.document_type {
    conds.push("r.document_type = ?", document_type.clone());
  }
  if let Some(confidentiality) = filter.confidentiality {
    conds.push("r.confidentiality = ?", encode_confidentiality(confidentiality));
  }
  conds.access(&filter.access);
  let where_clause = conds.where_clause();

  let total: i64 = conn.query_row(
    &format!(
      "SELECT COUNT(*) FROM identities i
       JOIN current_revisions r ON r.identity_id = i.identity_id
       {where_clause}"
    ),
    rusqlite::params_from_iter(conds.params()),
    |row| row.get(0),
  )?;

  // Past i64::MAX both mean "no bound".
  let limit = filter.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(-1));
  let offset = filter.offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));
  let mut stmt = conn.prepare(&format!(
    "SELECT {IDENTITY_COLUMNS}, {REVISION_COLUMNS} FROM identities i
     JOIN current_revisions r ON r.identity_id = i.identity_id
     {where_clause}
     ORDER BY i.created_at, i.identity_id
     LIMIT ? OFFSET ?"
  ))?;
  let params = conds.params_with([Value::Integer(limit), Value::Integer(offset)]);
  let raws = stmt
    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
      Ok((RawIdentity::from_row(row, 0)?, RawRevision::from_row(row, 3)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut items = Vec::with_capacity(raws.len());
  for (raw_identity, raw_revision) in raws {
    let identity = raw_identity.into_identity()?;
    let parts = if identity.is_locked() {
      parts_of(conn, identity.id)?
    } else {
      Vec::new()
    };
    items.push(Document { identity, revision: raw_revision.into_revision()?, parts });
  }
  Ok(Page { total: total as usize, items })
}

pub fn get_part(conn: &Connection, part_id: Uuid) -> Result<Option<UploadPart>> {
  part(conn, part_id)
}

/// The identity a part belongs or belonged to.
pub fn part_owner(conn: &Connection, part_id: Uuid) -> Result<Option<Uuid>> {
  let owner: Option<String> = conn
    .query_row(
      "SELECT identity_id FROM parts WHERE part_id = ?1
       UNION ALL
       SELECT identity_id FROM retired_parts WHERE part_id = ?1
       LIMIT 1",
      [encode_uuid(part_id)],
      |row| row.get(0),
    )
    .optional()?;
  owner.as_deref().map(decode_uuid).transpose()
}

pub fn referenced_blobs(conn: &Connection) -> Result<HashSet<BlobKey>> {
  let mut stmt = conn.prepare(
    "SELECT content_key FROM revisions WHERE content_key IS NOT NULL
     UNION
     SELECT blob_key FROM parts WHERE blob_key IS NOT NULL",
  )?;
  let keys = stmt
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(keys.into_iter().map(BlobKey::new).collect())
}

// ─── Transitions ─────────────────────────────────────────────────────────────

pub fn insert_document(conn: &mut Connection, new: NewDocument) -> Result<Document> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let mut metadata = new.metadata;
  if metadata.business_id.trim().is_empty() {
    metadata.business_id =
      next_business_id(&tx, &metadata.source_organization, new.registered_at.year())?;
  }

  let identity = DocumentIdentity {
    id:         Uuid::new_v4(),
    lock_token: new.lock_token,
    created_at: new.registered_at,
  };
  tx.execute(
    "INSERT INTO identities (identity_id, lock_token, created_at, source_organization, business_id)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    rusqlite::params![
      encode_uuid(identity.id),
      identity.lock_token.as_ref().map(LockToken::as_str),
      encode_dt(identity.created_at),
      metadata.source_organization,
      metadata.business_id,
    ],
  )
  .map_err(unique_on("businessId"))?;

  let revision = DocumentRevision {
    identity_id: identity.id,
    revision_id: Uuid::new_v4(),
    version: 1,
    registered_at: new.registered_at,
    metadata,
    size: new.size,
    content_key: new.content_key,
  };
  insert_revision(&tx, &revision)?;
  let parts = insert_parts(&tx, identity.id, &new.parts)?;

  tx.commit()?;
  Ok(Document { identity, revision, parts })
}

pub fn acquire_lock(
  conn: &mut Connection,
  id: Uuid,
  token: LockToken,
  registered_at: DateTime<Utc>,
  allow_final: bool,
) -> Result<Document> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let mut identity = identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  if identity.is_locked() {
    return Err(Conflict::ExistingLock.into());
  }
  let current = current_revision(&tx, id)?.ok_or_else(|| not_found(id))?;
  if !allow_final && current.metadata.status == Some(Status::Final) {
    return Err(Conflict::FinalStatus.into());
  }

  // Clocks may step backwards; registration order must follow version order.
  let registered_at = registered_at.max(current.registered_at);
  let working = current.next(registered_at);
  insert_revision(&tx, &working)?;
  set_lock_token(&tx, id, Some(&token))?;

  tx.commit()?;
  identity.lock_token = Some(token);
  Ok(Document { identity, revision: working, parts: Vec::new() })
}

pub fn save_working_copy(
  conn: &mut Connection,
  id: Uuid,
  token: LockToken,
  update: WorkingCopyUpdate,
) -> Result<Saved> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let identity = identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  check_token(&identity, &token)?;
  let mut revision = current_revision(&tx, id)?.ok_or_else(|| not_found(id))?;

  let mut candidates = Vec::new();
  if revision.content_key != update.content_key
    && let Some(old) = revision.content_key.take()
  {
    candidates.push(old);
  }

  let mut metadata = update.metadata;
  if metadata.business_id.trim().is_empty() {
    metadata.business_id =
      next_business_id(&tx, &metadata.source_organization, revision.registered_at.year())?;
  }
  revision.metadata = metadata;
  revision.size = update.size;
  revision.content_key = update.content_key;
  update_revision(&tx, &revision)?;
  set_business_key(&tx, id, &revision.metadata)?;

  let parts = match update.parts {
    PartsChange::Keep => parts_of(&tx, id)?,
    PartsChange::Replace(new_parts) => {
      candidates.extend(part_keys(&parts_of(&tx, id)?));
      retire_parts(&tx, id)?;
      insert_parts(&tx, id, &new_parts)?
    }
  };

  let released = orphaned(&tx, candidates)?;
  tx.commit()?;
  Ok(Saved { document: Document { identity, revision, parts }, released })
}

pub fn bind_part(
  conn: &mut Connection,
  id: Uuid,
  part_id: Uuid,
  token: LockToken,
  key: BlobKey,
) -> Result<(UploadPart, Option<BlobKey>)> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let identity = identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  check_token(&identity, &token)?;
  let mut part = part(&tx, part_id)?
    .filter(|p| p.identity_id == id)
    .ok_or_else(|| Error::Core(docreg_core::Error::not_found("part", part_id)))?;

  tx.execute(
    "UPDATE parts SET blob_key = ?2 WHERE part_id = ?1",
    rusqlite::params![encode_uuid(part_id), key.as_str()],
  )?;
  let previous = part.blob_key.replace(key);
  let released = orphaned(&tx, previous.into_iter().collect())?;

  tx.commit()?;
  Ok((part, released.into_iter().next()))
}

pub fn finalize_upload(
  conn: &mut Connection,
  id: Uuid,
  token: LockToken,
  expected: Vec<UploadPart>,
  content_key: BlobKey,
  size: u64,
) -> Result<Saved> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let mut identity = identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  check_token(&identity, &token)?;

  let stored = parts_of(&tx, id)?;
  let snapshot = |parts: &[UploadPart]| -> Vec<(Uuid, Option<BlobKey>)> {
    parts.iter().map(|p| (p.id, p.blob_key.clone())).collect()
  };
  if stored.is_empty()
    || !stored.iter().all(UploadPart::completed)
    || snapshot(&stored) != snapshot(&expected)
  {
    return Err(Conflict::IncompleteUpload.into());
  }

  let mut revision = current_revision(&tx, id)?.ok_or_else(|| not_found(id))?;
  let mut candidates: Vec<BlobKey> = part_keys(&stored).collect();
  candidates.extend(revision.content_key.replace(content_key));
  revision.size = Some(size);
  update_revision(&tx, &revision)?;

  retire_parts(&tx, id)?;
  set_lock_token(&tx, id, None)?;
  let released = orphaned(&tx, candidates)?;

  tx.commit()?;
  identity.lock_token = None;
  Ok(Saved { document: Document { identity, revision, parts: Vec::new() }, released })
}

pub fn release_lock(conn: &mut Connection, id: Uuid, unlock: Unlock) -> Result<Saved> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let mut identity = identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  let mut revision = current_revision(&tx, id)?.ok_or_else(|| not_found(id))?;
  let parts = parts_of(&tx, id)?;

  let mut candidates = Vec::new();
  match unlock {
    Unlock::Token(token) => {
      check_token(&identity, &token)?;
      if !parts.is_empty() {
        return Err(Conflict::IncompleteUpload.into());
      }
    }
    Unlock::Force => {
      if !identity.is_locked() {
        return Ok(Saved { document: Document { identity, revision, parts }, released: Vec::new() });
      }
      if !parts.is_empty() {
        candidates.extend(part_keys(&parts));
        retire_parts(&tx, id)?;
        revision.size = None;
        update_revision(&tx, &revision)?;
      }
    }
  }

  set_lock_token(&tx, id, None)?;
  let released = orphaned(&tx, candidates)?;
  tx.commit()?;
  identity.lock_token = None;
  Ok(Saved { document: Document { identity, revision, parts: Vec::new() }, released })
}

pub fn delete_document(conn: &mut Connection, id: Uuid) -> Result<Vec<BlobKey>> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  identity(&tx, id)?.ok_or_else(|| not_found(id))?;
  let id_str = encode_uuid(id);
  let linked: bool = tx.query_row(
    "SELECT EXISTS (SELECT 1 FROM object_links WHERE identity_id = ?1)",
    [&id_str],
    |row| row.get(0),
  )?;
  if linked {
    return Err(Conflict::PendingRelations.into());
  }

  let mut candidates: Vec<BlobKey> = {
    let mut stmt = tx.prepare(
      "SELECT content_key FROM revisions WHERE identity_id = ?1 AND content_key IS NOT NULL",
    )?;
    stmt
      .query_map([&id_str], |row| row.get::<_, String>(0))?
      .map(|k| k.map(BlobKey::new))
      .collect::<rusqlite::Result<_>>()?
  };
  candidates.extend(part_keys(&parts_of(&tx, id)?));

  for table in ["usage_rights", "sendings", "parts", "retired_parts", "revisions", "identities"] {
    tx.execute(&format!("DELETE FROM {table} WHERE identity_id = ?1"), [&id_str])?;
  }
  let released = orphaned(&tx, candidates)?;

  tx.commit()?;
  Ok(released)
}
