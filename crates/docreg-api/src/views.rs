//! Response representations. Every entity carries its own URL; references to
//! other entities are URLs too.

use chrono::{DateTime, NaiveDate, Utc};
use docreg_core::{
  document::{DocumentIdentity, DocumentMetadata, DocumentRevision, LockToken, UploadPart},
  relation::{
    Address, DomesticAddress, ForeignAddress, ObjectKind, ObjectLink, PostalAddress,
    RelationKind, Sending, SendingRole, UsageRight,
  },
};
use serde::Serialize;
use uuid::Uuid;

/// Builds self-URLs under the configured base.
#[derive(Debug, Clone, Copy)]
pub struct Urls<'a>(pub &'a str);

impl Urls<'_> {
  pub fn document(&self, id: Uuid) -> String { format!("{}/documents/{id}", self.0) }

  pub fn download(&self, id: Uuid, version: u32) -> String {
    format!("{}/documents/{id}/download?version={version}", self.0)
  }

  pub fn part(&self, id: Uuid) -> String { format!("{}/parts/{id}", self.0) }

  pub fn usage_right(&self, id: Uuid) -> String { format!("{}/usageRights/{id}", self.0) }

  pub fn object_link(&self, id: Uuid) -> String { format!("{}/objectLinks/{id}", self.0) }

  pub fn sending(&self, id: Uuid) -> String { format!("{}/sendings/{id}", self.0) }
}

// ─── Documents ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
  pub url:           String,
  pub id:            Uuid,
  pub version:       u32,
  pub registered_at: DateTime<Utc>,
  #[serde(flatten)]
  pub metadata:      DocumentMetadata,
  /// Download URL of this revision's body.
  pub content:       String,
  pub size:          Option<u64>,
  pub locked:        bool,
  pub parts:         Vec<PartView>,
  /// Only returned to the client that just acquired the lock.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lock_token:    Option<LockToken>,
}

impl DocumentView {
  pub fn new(
    urls: Urls<'_>,
    identity: &DocumentIdentity,
    revision: DocumentRevision,
    parts: &[UploadPart],
  ) -> Self {
    Self {
      url:           urls.document(identity.id),
      id:            identity.id,
      version:       revision.version,
      registered_at: revision.registered_at,
      content:       urls.download(identity.id, revision.version),
      size:          revision.size,
      locked:        identity.is_locked(),
      parts:         parts.iter().map(|p| PartView::new(urls, p)).collect(),
      lock_token:    None,
      metadata:      revision.metadata,
    }
  }

  pub fn with_lock_token(mut self, identity: &DocumentIdentity) -> Self {
    self.lock_token = identity.lock_token.clone();
    self
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartView {
  pub url:           String,
  pub id:            Uuid,
  pub document:      String,
  pub ordinal:       u32,
  pub expected_size: u64,
  pub completed:     bool,
}

impl PartView {
  pub fn new(urls: Urls<'_>, part: &UploadPart) -> Self {
    Self {
      url:           urls.part(part.id),
      id:            part.id,
      document:      urls.document(part.identity_id),
      ordinal:       part.ordinal,
      expected_size: part.expected_size,
      completed:     part.completed(),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockView {
  pub lock_token: Option<LockToken>,
}

/// One page of a listing.
#[derive(Debug, Serialize)]
pub struct PageView<T> {
  pub count:    usize,
  pub next:     Option<String>,
  pub previous: Option<String>,
  pub results:  Vec<T>,
}

// ─── Relations ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRightView {
  pub url:         String,
  pub identity:    String,
  pub description: String,
  pub start_at:    DateTime<Utc>,
  pub end_at:      Option<DateTime<Utc>>,
}

impl UsageRightView {
  pub fn new(urls: Urls<'_>, right: UsageRight) -> Self {
    Self {
      url:         urls.usage_right(right.id),
      identity:    urls.document(right.identity_id),
      description: right.description,
      start_at:    right.start_at,
      end_at:      right.end_at,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLinkView {
  pub url:                 String,
  pub identity:            String,
  pub external_object_url: String,
  pub object_kind:         ObjectKind,
  pub relation_kind:       RelationKind,
}

impl ObjectLinkView {
  pub fn new(urls: Urls<'_>, link: ObjectLink) -> Self {
    Self {
      url:                 urls.object_link(link.id),
      identity:            urls.document(link.identity_id),
      relation_kind:       link.relation_kind(),
      object_kind:         link.object_kind,
      external_object_url: link.external_object_url,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendingView {
  pub url:              String,
  pub identity:         String,
  pub addressee:        String,
  pub role:             SendingRole,
  pub note:             String,
  pub received_on:      Option<NaiveDate>,
  pub sent_on:          Option<NaiveDate>,
  pub contact:          Option<String>,
  pub contact_name:     String,
  pub domestic_address: Option<DomesticAddress>,
  pub foreign_address:  Option<ForeignAddress>,
  pub postal_address:   Option<PostalAddress>,
}

impl SendingView {
  pub fn new(urls: Urls<'_>, sending: Sending) -> Self {
    let (domestic_address, foreign_address, postal_address) = match sending.address {
      Address::Domestic(a) => (Some(a), None, None),
      Address::Foreign(a) => (None, Some(a), None),
      Address::Postal(a) => (None, None, Some(a)),
    };
    Self {
      url: urls.sending(sending.id),
      identity: urls.document(sending.identity_id),
      addressee: sending.addressee,
      role: sending.role,
      note: sending.note,
      received_on: sending.received_on,
      sent_on: sending.sent_on,
      contact: sending.contact,
      contact_name: sending.contact_name,
      domestic_address,
      foreign_address,
      postal_address,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use docreg_core::document::{Confidentiality, UsageRightsIndicator};

  use super::*;

  #[test]
  fn document_view_flattens_metadata_and_links_content() {
    let id = Uuid::new_v4();
    let identity = DocumentIdentity { id, lock_token: None, created_at: Utc::now() };
    let revision = DocumentRevision {
      identity_id:   id,
      revision_id:   Uuid::new_v4(),
      version:       3,
      registered_at: Utc::now(),
      metadata:      DocumentMetadata {
        source_organization:    "159351741".into(),
        business_id:            "DOCUMENT-2018-0000000001".into(),
        creation_date:          NaiveDate::from_ymd_opt(2018, 6, 27).unwrap(),
        title:                  "s".into(),
        confidentiality:        Confidentiality::Public,
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
        document_type:          "https://ext/dt/1".into(),
        integrity:              None,
        signing:                None,
      },
      size:          Some(17),
      content_key:   None,
    };

    let view = DocumentView::new(Urls("http://h"), &identity, revision, &[]);
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["url"], format!("http://h/documents/{id}"));
    assert_eq!(json["content"], format!("http://h/documents/{id}/download?version=3"));
    assert_eq!(json["title"], "s");
    assert_eq!(json["confidentiality"], "PUBLIC");
    assert_eq!(json["usageRightsIndicator"], "UNKNOWN");
    assert_eq!(json["locked"], false);
    assert!(json.get("lockToken").is_none());
    assert!(json.get("contentKey").is_none());
  }
}
