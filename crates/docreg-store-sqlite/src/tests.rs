//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, NaiveDate, Utc};
use docreg_core::{
  Conflict, Error as CoreError,
  authz::{Access, Rule},
  blob::BlobKey,
  document::{
    Confidentiality, DocumentMetadata, LockState, LockToken, NewDocument, NewPart, Status,
    UsageRightsIndicator,
  },
  relation::{
    Address, ObjectKind, ObjectLink, PostalAddress, PostalBoxKind, Sending, SendingRole,
    UsageRight,
  },
  store::{PartsChange, RelationFilter, Repository, RevisionFilter, Unlock, WorkingCopyUpdate},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn metadata(document_type: &str, confidentiality: Confidentiality) -> DocumentMetadata {
  DocumentMetadata {
    source_organization:    "159351741".into(),
    business_id:            String::new(),
    creation_date:          NaiveDate::from_ymd_opt(2018, 6, 27).unwrap(),
    title:                  "s".into(),
    confidentiality,
    author:                 "a".into(),
    status:                 None,
    description:            String::new(),
    received_on:            None,
    sent_on:                None,
    usage_rights_indicator: UsageRightsIndicator::Unknown,
    format:                 "txt".into(),
    language:               "eng".into(),
    filename:               "d.txt".into(),
    external_link:          None,
    document_type:          document_type.into(),
    integrity:              None,
    signing:                None,
  }
}

fn inline(meta: DocumentMetadata, key: &str) -> NewDocument {
  NewDocument {
    metadata:      meta,
    size:          Some(17),
    content_key:   Some(BlobKey::new(key)),
    parts:         Vec::new(),
    lock_token:    None,
    registered_at: Utc::now(),
  }
}

fn chunked(meta: DocumentMetadata, token: &str) -> NewDocument {
  NewDocument {
    metadata:      meta,
    size:          Some(17),
    content_key:   None,
    parts:         vec![
      NewPart { ordinal: 1, expected_size: 10 },
      NewPart { ordinal: 2, expected_size: 7 },
    ],
    lock_token:    Some(LockToken::new(token)),
    registered_at: Utc::now(),
  }
}

fn conflict(e: Error) -> Conflict {
  match CoreError::from(e) {
    CoreError::Conflict(c) => c,
    other => panic!("expected a conflict, got {other:?}"),
  }
}

fn token(s: &str) -> LockToken { LockToken::new(s) }

async fn indicator(s: &SqliteStore, id: Uuid) -> UsageRightsIndicator {
  s.get_document(id)
    .await
    .unwrap()
    .unwrap()
    .revision
    .metadata
    .usage_rights_indicator
}

// ─── Documents & versions ────────────────────────────────────────────────────

#[tokio::test]
async fn insert_assigns_version_one_and_business_id() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();

  assert_eq!(doc.revision.version, 1);
  assert_eq!(doc.state(), LockState::Unlocked);
  let year = Utc::now().format("%Y");
  assert_eq!(doc.revision.metadata.business_id, format!("DOCUMENT-{year}-0000000001"));

  let second = s
    .insert_document(inline(metadata("dt", Confidentiality::Public), "k2"))
    .await
    .unwrap();
  assert_eq!(second.revision.metadata.business_id, format!("DOCUMENT-{year}-0000000002"));

  let fetched = s.get_document(doc.identity.id).await.unwrap().unwrap();
  assert_eq!(fetched.revision.revision_id, doc.revision.revision_id);
  assert_eq!(fetched.revision.content_key, Some(BlobKey::new("k1")));
}

#[tokio::test]
async fn business_key_is_unique_across_identities() {
  let s = store().await;
  let mut meta = metadata("dt", Confidentiality::Public);
  meta.business_id = "B-1".into();
  s.insert_document(inline(meta.clone(), "k1")).await.unwrap();

  let err = s.insert_document(inline(meta, "k2")).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Unique { field: "businessId" }));
}

#[tokio::test]
async fn lock_clones_into_next_version() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();
  let id = doc.identity.id;

  let locked = s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap();
  assert_eq!(locked.revision.version, 2);
  assert_eq!(locked.state(), LockState::LockedIdle);
  assert_eq!(locked.revision.content_key, doc.revision.content_key);

  let err = s.acquire_lock(id, token("u"), Utc::now(), false).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::ExistingLock);

  s.release_lock(id, Unlock::Token(token("t"))).await.unwrap();
  let versions: Vec<u32> =
    s.list_revisions(id).await.unwrap().iter().map(|r| r.version).collect();
  assert_eq!(versions, [1, 2]);
}

#[tokio::test]
async fn save_mutates_the_working_copy_in_place() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();
  let id = doc.identity.id;
  let locked = s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap();

  let mut meta = locked.revision.metadata.clone();
  meta.title = "s2".into();
  let update = WorkingCopyUpdate {
    metadata:    meta,
    size:        locked.revision.size,
    content_key: locked.revision.content_key.clone(),
    parts:       PartsChange::Keep,
  };

  let err = s.save_working_copy(id, token("wrong"), update.clone()).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::IncorrectLockId);

  let saved = s.save_working_copy(id, token("t"), update).await.unwrap();
  assert_eq!(saved.document.revision.version, 2);
  assert!(saved.released.is_empty(), "the shared body is still referenced by v1");

  assert_eq!(s.get_revision(id, 1).await.unwrap().unwrap().metadata.title, "s");
  assert_eq!(s.get_revision(id, 2).await.unwrap().unwrap().metadata.title, "s2");
  assert!(s.get_revision(id, 3).await.unwrap().is_none());
}

#[tokio::test]
async fn save_without_lock_is_rejected() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();
  let update = WorkingCopyUpdate {
    metadata:    doc.revision.metadata.clone(),
    size:        doc.revision.size,
    content_key: doc.revision.content_key.clone(),
    parts:       PartsChange::Keep,
  };
  let err = s.save_working_copy(doc.identity.id, token("t"), update).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::Unlocked);
}

#[tokio::test]
async fn replacing_content_releases_the_unshared_key() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();
  let id = doc.identity.id;
  let locked = s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap();

  let write = |key: &str| WorkingCopyUpdate {
    metadata:    locked.revision.metadata.clone(),
    size:        Some(3),
    content_key: Some(BlobKey::new(key)),
    parts:       PartsChange::Keep,
  };
  let first = s.save_working_copy(id, token("t"), write("k2")).await.unwrap();
  assert!(first.released.is_empty());

  let second = s.save_working_copy(id, token("t"), write("k3")).await.unwrap();
  assert_eq!(second.released, [BlobKey::new("k2")]);
}

#[tokio::test]
async fn lock_on_final_requires_override() {
  let s = store().await;
  let mut meta = metadata("dt", Confidentiality::Public);
  meta.status = Some(Status::Final);
  let doc = s.insert_document(inline(meta, "k1")).await.unwrap();
  let id = doc.identity.id;

  let err = s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::FinalStatus);
  assert_eq!(s.list_revisions(id).await.unwrap().len(), 1);

  s.acquire_lock(id, token("t"), Utc::now(), true).await.unwrap();
}

#[tokio::test]
async fn point_in_time_reads() {
  let s = store().await;
  let mut new = inline(metadata("dt", Confidentiality::Public), "k1");
  let t0 = Utc::now() - Duration::hours(2);
  new.registered_at = t0;
  let id = s.insert_document(new).await.unwrap().identity.id;
  let t1 = t0 + Duration::hours(1);
  s.acquire_lock(id, token("t"), t1, false).await.unwrap();

  assert!(s.revision_as_of(id, t0 - Duration::seconds(1)).await.unwrap().is_none());
  assert_eq!(s.revision_as_of(id, t0).await.unwrap().unwrap().version, 1);
  assert_eq!(s.revision_as_of(id, t1 - Duration::seconds(1)).await.unwrap().unwrap().version, 1);
  assert_eq!(s.revision_as_of(id, t1).await.unwrap().unwrap().version, 2);
}

// ─── Chunked uploads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn chunked_upload_finalizes() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  let id = doc.identity.id;
  assert_eq!(doc.state(), LockState::AwaitingParts);
  assert_eq!(doc.parts.iter().map(|p| p.expected_size).collect::<Vec<_>>(), [10, 7]);

  let (p1, previous) =
    s.bind_part(id, doc.parts[0].id, token("t"), BlobKey::new("a")).await.unwrap();
  assert!(previous.is_none());
  assert!(p1.completed());

  let err = s.release_lock(id, Unlock::Token(token("t"))).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::IncompleteUpload);

  s.bind_part(doc.identity.id, doc.parts[1].id, token("t"), BlobKey::new("b")).await.unwrap();
  let current = s.get_document(id).await.unwrap().unwrap();
  assert_eq!(current.state(), LockState::PartsComplete);
  assert!(current.revision.content_key.is_none());

  let saved = s
    .finalize_upload(id, token("t"), current.parts.clone(), BlobKey::new("ab"), 17)
    .await
    .unwrap();
  let mut released = saved.released.clone();
  released.sort();
  assert_eq!(released, [BlobKey::new("a"), BlobKey::new("b")]);

  let after = s.get_document(id).await.unwrap().unwrap();
  assert_eq!(after.state(), LockState::Unlocked);
  assert!(after.parts.is_empty());
  assert_eq!(after.revision.content_key, Some(BlobKey::new("ab")));
  assert_eq!(after.revision.size, Some(17));
}

#[tokio::test]
async fn finalize_rejects_a_stale_snapshot() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  s.bind_part(doc.identity.id, doc.parts[0].id, token("t"), BlobKey::new("a")).await.unwrap();
  s.bind_part(doc.identity.id, doc.parts[1].id, token("t"), BlobKey::new("b")).await.unwrap();
  let snapshot = s.get_document(doc.identity.id).await.unwrap().unwrap().parts;

  let (_, previous) = s
    .bind_part(doc.identity.id, doc.parts[1].id, token("t"), BlobKey::new("b2"))
    .await
    .unwrap();
  assert_eq!(previous, Some(BlobKey::new("b")));

  let err = s
    .finalize_upload(doc.identity.id, token("t"), snapshot, BlobKey::new("ab"), 17)
    .await
    .unwrap_err();
  assert_eq!(conflict(err), Conflict::IncompleteUpload);
}

#[tokio::test]
async fn part_writes_after_unlock_are_rejected() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  let id = doc.identity.id;
  s.release_lock(id, Unlock::Force).await.unwrap();

  let err = s.bind_part(id, doc.parts[0].id, token("t"), BlobKey::new("a")).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::Unlocked);
  assert_eq!(s.part_owner(doc.parts[0].id).await.unwrap(), Some(id));

  // Locked again under another token, the old token is simply wrong.
  s.acquire_lock(id, token("u"), Utc::now(), false).await.unwrap();
  let err = s.bind_part(id, doc.parts[1].id, token("t"), BlobKey::new("b")).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::IncorrectLockId);
  // The new holder cannot write to them either.
  let err = s.bind_part(id, doc.parts[1].id, token("u"), BlobKey::new("b")).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::NotFound { kind: "part", .. }));
}

#[tokio::test]
async fn deleting_a_document_forgets_its_parts() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  let id = doc.identity.id;
  s.release_lock(id, Unlock::Force).await.unwrap();
  s.delete_document(id).await.unwrap();
  assert_eq!(s.part_owner(doc.parts[0].id).await.unwrap(), None);
}

#[tokio::test]
async fn forced_unlock_discards_parts_and_size() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  let id = doc.identity.id;
  s.bind_part(doc.identity.id, doc.parts[0].id, token("t"), BlobKey::new("a")).await.unwrap();

  let saved = s.release_lock(id, Unlock::Force).await.unwrap();
  assert_eq!(saved.released, [BlobKey::new("a")]);

  let after = s.get_document(id).await.unwrap().unwrap();
  assert_eq!(after.state(), LockState::Unlocked);
  assert!(after.parts.is_empty());
  assert_eq!(after.revision.size, None);

  // Forcing an unlocked document changes nothing.
  let again = s.release_lock(id, Unlock::Force).await.unwrap();
  assert!(again.released.is_empty());
}

#[tokio::test]
async fn reallocating_parts_releases_uploaded_ones() {
  let s = store().await;
  let doc = s.insert_document(chunked(metadata("dt", Confidentiality::Public), "t")).await.unwrap();
  let id = doc.identity.id;
  s.bind_part(doc.identity.id, doc.parts[0].id, token("t"), BlobKey::new("a")).await.unwrap();

  let saved = s
    .save_working_copy(id, token("t"), WorkingCopyUpdate {
      metadata:    doc.revision.metadata.clone(),
      size:        Some(5),
      content_key: None,
      parts:       PartsChange::Replace(vec![NewPart { ordinal: 1, expected_size: 5 }]),
    })
    .await
    .unwrap();
  assert_eq!(saved.released, [BlobKey::new("a")]);
  assert_eq!(saved.document.parts.len(), 1);
  assert!(s.get_part(doc.parts[0].id).await.unwrap().is_none());
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_is_blocked_by_object_links_then_cascades() {
  let s = store().await;
  let doc = s.insert_document(inline(metadata("dt", Confidentiality::Public), "k1")).await.unwrap();
  let id = doc.identity.id;
  s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap();
  s.release_lock(id, Unlock::Token(token("t"))).await.unwrap();

  let link = ObjectLink {
    id:                  Uuid::new_v4(),
    identity_id:         id,
    external_object_url: "https://ext/cases/1".into(),
    object_kind:         ObjectKind::Case,
  };
  s.insert_object_link(link.clone()).await.unwrap();
  s.insert_usage_right(UsageRight {
    id:          Uuid::new_v4(),
    identity_id: id,
    description: "use".into(),
    start_at:    Utc::now(),
    end_at:      None,
  })
  .await
  .unwrap();

  let err = s.delete_document(id).await.unwrap_err();
  assert_eq!(conflict(err), Conflict::PendingRelations);

  s.delete_object_link(link.id).await.unwrap();
  let released = s.delete_document(id).await.unwrap();
  assert_eq!(released, [BlobKey::new("k1")]);

  assert!(s.get_document(id).await.unwrap().is_none());
  assert!(s.list_revisions(id).await.unwrap().is_empty());
  assert!(s.list_usage_rights(&RelationFilter::new(Access::All)).await.unwrap().is_empty());
  assert!(s.referenced_blobs().await.unwrap().is_empty());
}

// ─── Listing & authorization ─────────────────────────────────────────────────

#[tokio::test]
async fn current_documents_applies_the_access_predicate() {
  let s = store().await;
  for (n, (ty, conf)) in [
    ("ok", Confidentiality::Public),
    ("ok", Confidentiality::TopSecret),
    ("not_ok", Confidentiality::Public),
    ("not_ok", Confidentiality::TopSecret),
  ]
  .into_iter()
  .enumerate()
  {
    s.insert_document(inline(metadata(ty, conf), &format!("k{n}"))).await.unwrap();
  }

  let access = Access::Restricted(vec![Rule {
    document_type:       "ok".into(),
    max_confidentiality: Confidentiality::Public,
  }]);
  let page = s.current_documents(&RevisionFilter::new(access)).await.unwrap();
  assert_eq!(page.total, 1);
  assert_eq!(page.items[0].revision.metadata.document_type, "ok");
  assert_eq!(page.items[0].revision.metadata.confidentiality, Confidentiality::Public);

  let all = s.current_documents(&RevisionFilter::new(Access::All)).await.unwrap();
  assert_eq!(all.total, 4);

  let none = s.current_documents(&RevisionFilter::new(Access::Restricted(vec![]))).await.unwrap();
  assert_eq!(none.total, 0);
}

#[tokio::test]
async fn current_documents_returns_one_row_per_identity() {
  let s = store().await;
  let id = s
    .insert_document(inline(metadata("dt", Confidentiality::Public), "k1"))
    .await
    .unwrap()
    .identity
    .id;
  s.acquire_lock(id, token("t"), Utc::now(), false).await.unwrap();
  let other = s
    .insert_document(inline(metadata("dt", Confidentiality::Public), "k2"))
    .await
    .unwrap();

  let mut filter = RevisionFilter::new(Access::All);
  let page = s.current_documents(&filter).await.unwrap();
  assert_eq!(page.total, 2);
  let mine = page.items.iter().find(|d| d.identity.id == id).unwrap();
  assert_eq!(mine.revision.version, 2);
  assert!(mine.identity.is_locked());

  filter.ids = Some(vec![other.identity.id]);
  let page = s.current_documents(&filter).await.unwrap();
  assert_eq!(page.items.len(), 1);
  assert_eq!(page.items[0].identity.id, other.identity.id);

  filter.ids = None;
  filter.limit = Some(1);
  filter.offset = Some(1);
  let page = s.current_documents(&filter).await.unwrap();
  assert_eq!(page.total, 2);
  assert_eq!(page.items.len(), 1);
}

// ─── Relations ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn usage_rights_drive_the_indicator() {
  let s = store().await;
  let id = s
    .insert_document(inline(metadata("dt", Confidentiality::Public), "k1"))
    .await
    .unwrap()
    .identity
    .id;
  let right = |n: i64| UsageRight {
    id:          Uuid::new_v4(),
    identity_id: id,
    description: format!("right {n}"),
    start_at:    Utc::now(),
    end_at:      None,
  };
  let first = s.insert_usage_right(right(1)).await.unwrap();
  let second = s.insert_usage_right(right(2)).await.unwrap();
  assert_eq!(indicator(&s, id).await, UsageRightsIndicator::True);

  s.delete_usage_right(first.id).await.unwrap();
  assert_eq!(indicator(&s, id).await, UsageRightsIndicator::True);
  s.delete_usage_right(second.id).await.unwrap();
  assert_eq!(indicator(&s, id).await, UsageRightsIndicator::Unknown);
}

#[tokio::test]
async fn object_links_are_unique_per_document() {
  let s = store().await;
  let id = s
    .insert_document(inline(metadata("dt", Confidentiality::Public), "k1"))
    .await
    .unwrap()
    .identity
    .id;
  let link = |url: &str| ObjectLink {
    id:                  Uuid::new_v4(),
    identity_id:         id,
    external_object_url: url.into(),
    object_kind:         ObjectKind::Decision,
  };
  s.insert_object_link(link("https://ext/decisions/1")).await.unwrap();
  let err = s.insert_object_link(link("https://ext/decisions/1")).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::Unique { field: "object" }));

  s.insert_object_link(link("https://ext/decisions/2")).await.unwrap();
  let mut filter = RelationFilter::new(Access::All);
  filter.object = Some("https://ext/decisions/2".into());
  assert_eq!(s.list_object_links(&filter).await.unwrap().len(), 1);
}

#[tokio::test]
async fn relations_require_an_existing_document() {
  let s = store().await;
  let err = s
    .insert_object_link(ObjectLink {
      id:                  Uuid::new_v4(),
      identity_id:         Uuid::new_v4(),
      external_object_url: "https://ext/cases/1".into(),
      object_kind:         ObjectKind::Case,
    })
    .await
    .unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::NotFound { kind: "document", .. }));
}

#[tokio::test]
async fn sendings_round_trip_and_filter() {
  let s = store().await;
  let visible = s
    .insert_document(inline(metadata("ok", Confidentiality::Public), "k1"))
    .await
    .unwrap()
    .identity
    .id;
  let hidden = s
    .insert_document(inline(metadata("ok", Confidentiality::Secret), "k2"))
    .await
    .unwrap()
    .identity
    .id;
  let sending = |identity_id: Uuid, role: SendingRole| Sending {
    id: Uuid::new_v4(),
    identity_id,
    addressee: "https://ext/subjects/1".into(),
    role,
    note: String::new(),
    received_on: None,
    sent_on: NaiveDate::from_ymd_opt(2020, 2, 3),
    contact: None,
    contact_name: "desk".into(),
    address: Address::Postal(PostalAddress {
      box_kind:    PostalBoxKind::ReplyNumber,
      box_number:  42,
      postal_code: "1000AA".into(),
      city:        "Amsterdam".into(),
    }),
  };
  let stored = s.insert_sending(sending(visible, SendingRole::Recipient)).await.unwrap();
  s.insert_sending(sending(visible, SendingRole::Sender)).await.unwrap();
  s.insert_sending(sending(hidden, SendingRole::Recipient)).await.unwrap();

  assert_eq!(s.get_sending(stored.id).await.unwrap().unwrap(), stored);

  let mut filter = RelationFilter::new(Access::Restricted(vec![Rule {
    document_type:       "ok".into(),
    max_confidentiality: Confidentiality::Internal,
  }]));
  assert_eq!(s.list_sendings(&filter).await.unwrap().len(), 2);
  filter.role = Some(SendingRole::Recipient);
  assert_eq!(s.list_sendings(&filter).await.unwrap(), [stored.clone()]);

  let mut changed = stored.clone();
  changed.note = "updated".into();
  s.update_sending(changed.clone()).await.unwrap();
  assert_eq!(s.get_sending(stored.id).await.unwrap().unwrap().note, "updated");

  s.delete_sending(stored.id).await.unwrap();
  let err = s.delete_sending(stored.id).await.unwrap_err();
  assert!(matches!(CoreError::from(err), CoreError::NotFound { kind: "sending", .. }));
}
