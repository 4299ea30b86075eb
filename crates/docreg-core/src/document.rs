//! Document types: the logical identity, its immutable revisions, and the
//! upload parts of an in-progress chunked body.
//!
//! A document is a stable [`DocumentIdentity`] manifested as a chain of
//! [`DocumentRevision`]s numbered `1..=N`. The revision with the greatest
//! version is the current one. Locking clones the current revision into a
//! working copy that later updates mutate in place.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{
  blob::BlobKey,
  validation::{ValidationCode, ValidationErrors, is_valid_language, is_valid_rsin},
};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// A totally ordered confidentiality label. Declaration order is rank order:
/// `PUBLIC` is the lowest, `TOP_SECRET` the highest.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidentiality {
  Public,
  RestrictedPublic,
  Internal,
  CaseSensitive,
  Confidential,
  HighlyConfidential,
  Secret,
  TopSecret,
}

impl Confidentiality {
  /// Position in the fixed total order, starting at 0 for `PUBLIC`.
  pub fn rank(self) -> u8 { self as u8 }
}

/// Lifecycle status of a revision. An empty status is `Option::None`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Draft,
  ForApproval,
  Final,
  Archived,
}

impl Status {
  /// Statuses that cannot coexist with a `receivedOn` date.
  pub fn is_pre_receipt(self) -> bool {
    matches!(self, Self::Draft | Self::ForApproval)
  }
}

/// Whether usage rights are recorded for the document. `Unknown` is a real
/// third state, not an absent boolean.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  AsRefStr,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageRightsIndicator {
  True,
  False,
  #[default]
  Unknown,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
pub enum IntegrityAlgorithm {
  #[serde(rename = "CRC_16")]
  #[strum(serialize = "CRC_16")]
  Crc16,
  #[serde(rename = "CRC_32")]
  #[strum(serialize = "CRC_32")]
  Crc32,
  #[serde(rename = "CRC_64")]
  #[strum(serialize = "CRC_64")]
  Crc64,
  #[serde(rename = "FLETCHER_4")]
  #[strum(serialize = "FLETCHER_4")]
  Fletcher4,
  #[serde(rename = "FLETCHER_8")]
  #[strum(serialize = "FLETCHER_8")]
  Fletcher8,
  #[serde(rename = "FLETCHER_16")]
  #[strum(serialize = "FLETCHER_16")]
  Fletcher16,
  #[serde(rename = "FLETCHER_32")]
  #[strum(serialize = "FLETCHER_32")]
  Fletcher32,
  #[serde(rename = "HMAC")]
  #[strum(serialize = "HMAC")]
  Hmac,
  #[serde(rename = "MD5")]
  #[strum(serialize = "MD5")]
  Md5,
  #[serde(rename = "SHA_1")]
  #[strum(serialize = "SHA_1")]
  Sha1,
  #[serde(rename = "SHA_256")]
  #[strum(serialize = "SHA_256")]
  Sha256,
  #[serde(rename = "SHA_512")]
  #[strum(serialize = "SHA_512")]
  Sha512,
  #[serde(rename = "SHA_3")]
  #[strum(serialize = "SHA_3")]
  Sha3,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningKind {
  Analog,
  Digital,
  Pki,
}

// ─── Descriptor groups ───────────────────────────────────────────────────────

/// Checksum information supplied by the client. Nested on the wire, flat in
/// storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integrity {
  pub algorithm: IntegrityAlgorithm,
  pub value:     String,
  pub date:      NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signing {
  pub kind: SigningKind,
  pub date: NaiveDate,
}

// ─── Lock token ──────────────────────────────────────────────────────────────

/// Opaque high-entropy string whose possession authorises mutation of a single
/// locked document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
  pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for LockToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Client-controlled fields of a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
  /// RSIN of the organisation that produced the document.
  pub source_organization:    String,
  /// Unique within `source_organization`; generated by the store when empty.
  pub business_id:            String,
  pub creation_date:          NaiveDate,
  pub title:                  String,
  pub confidentiality:        Confidentiality,
  pub author:                 String,
  pub status:                 Option<Status>,
  pub description:            String,
  pub received_on:            Option<NaiveDate>,
  pub sent_on:                Option<NaiveDate>,
  pub usage_rights_indicator: UsageRightsIndicator,
  /// Media type; free text.
  pub format:                 String,
  /// ISO 639-2/B code.
  pub language:               String,
  pub filename:               String,
  pub external_link:          Option<String>,
  /// URL of the external document type. Immutable after the first revision.
  pub document_type:          String,
  pub integrity:              Option<Integrity>,
  pub signing:                Option<Signing>,
}

impl DocumentMetadata {
  /// Check every field-level and cross-field invariant, collecting all
  /// violations rather than stopping at the first.
  pub fn validate(&self) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if errors.not_blank("sourceOrganization", &self.source_organization)
      && !is_valid_rsin(&self.source_organization)
    {
      errors.push(
        "sourceOrganization",
        ValidationCode::Invalid,
        "must be a 9-digit RSIN passing the eleven-test",
      );
    }
    errors.max_length("businessId", &self.business_id, 40);
    if errors.not_blank("title", &self.title) {
      errors.max_length("title", &self.title, 200);
    }
    if errors.not_blank("author", &self.author) {
      errors.max_length("author", &self.author, 200);
    }
    errors.max_length("description", &self.description, 1000);
    errors.max_length("format", &self.format, 255);
    errors.max_length("filename", &self.filename, 255);
    if let Some(link) = &self.external_link {
      errors.max_length("externalLink", link, 200);
    }
    if errors.not_blank("language", &self.language)
      && !is_valid_language(&self.language)
    {
      errors.push(
        "language",
        ValidationCode::Invalid,
        "must be a three-letter ISO 639-2/B code",
      );
    }
    errors.not_blank("documentType", &self.document_type);
    if let Some(integrity) = &self.integrity {
      errors.max_length("integrity.value", &integrity.value, 128);
    }

    if self.received_on.is_some()
      && let Some(status) = self.status
      && status.is_pre_receipt()
    {
      errors.push(
        "status",
        ValidationCode::InvalidForReceived,
        format!(
          "status {} is not allowed when receivedOn is set",
          status.as_ref()
        ),
      );
    }

    errors.into_result()
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial (or, with every field set, full) change to a working copy.
/// Double options distinguish "leave unchanged" from "clear".
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
  pub source_organization:    Option<String>,
  pub business_id:            Option<String>,
  pub creation_date:          Option<NaiveDate>,
  pub title:                  Option<String>,
  pub confidentiality:        Option<Confidentiality>,
  pub author:                 Option<String>,
  pub status:                 Option<Option<Status>>,
  pub description:            Option<String>,
  pub received_on:            Option<Option<NaiveDate>>,
  pub sent_on:                Option<Option<NaiveDate>>,
  pub usage_rights_indicator: Option<UsageRightsIndicator>,
  pub format:                 Option<String>,
  pub language:               Option<String>,
  pub filename:               Option<String>,
  pub external_link:          Option<Option<String>>,
  pub document_type:          Option<String>,
  pub integrity:              Option<Option<Integrity>>,
  pub signing:                Option<Option<Signing>>,
}

impl DocumentPatch {
  /// Apply to `meta`. Fails with [`ValidationCode::Immutable`] if the patch
  /// tries to change the document type; the result is not re-validated here.
  pub fn apply(self, meta: &mut DocumentMetadata) -> Result<(), ValidationErrors> {
    if let Some(document_type) = self.document_type
      && document_type != meta.document_type
    {
      let mut errors = ValidationErrors::new();
      errors.push(
        "documentType",
        ValidationCode::Immutable,
        "the document type cannot be changed",
      );
      return Err(errors);
    }

    macro_rules! set {
      ($($field:ident),* $(,)?) => {
        $(if let Some(v) = self.$field { meta.$field = v; })*
      };
    }
    set!(
      source_organization,
      business_id,
      creation_date,
      title,
      confidentiality,
      author,
      status,
      description,
      received_on,
      sent_on,
      usage_rights_indicator,
      format,
      language,
      filename,
      external_link,
      integrity,
      signing,
    );
    Ok(())
  }
}

// ─── Identity & revision ─────────────────────────────────────────────────────

/// The logical document: a stable id plus the lock that serialises mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIdentity {
  pub id:         Uuid,
  /// `None` when unlocked.
  pub lock_token: Option<LockToken>,
  pub created_at: DateTime<Utc>,
}

impl DocumentIdentity {
  pub fn is_locked(&self) -> bool { self.lock_token.is_some() }
}

/// An immutable snapshot of a document (the working copy excepted, which is
/// mutable only while its identity is locked).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRevision {
  pub identity_id:   Uuid,
  pub revision_id:   Uuid,
  /// Contiguous from 1 within an identity.
  pub version:       u32,
  /// Server-assigned; never changes after creation.
  pub registered_at: DateTime<Utc>,
  pub metadata:      DocumentMetadata,
  pub size:          Option<u64>,
  /// `None` while content is being assembled, or when there is no body.
  pub content_key:   Option<BlobKey>,
}

impl DocumentRevision {
  /// Build the next revision of `self`: same content, fresh id and timestamp.
  pub fn next(&self, registered_at: DateTime<Utc>) -> Self {
    Self {
      identity_id: self.identity_id,
      revision_id: Uuid::new_v4(),
      version: self.version + 1,
      registered_at,
      metadata: self.metadata.clone(),
      size: self.size,
      content_key: self.content_key.clone(),
    }
  }
}

// ─── Upload parts ────────────────────────────────────────────────────────────

/// One slice of a large body under upload, addressed by `(identity_id,
/// ordinal)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPart {
  pub id:            Uuid,
  pub identity_id:   Uuid,
  /// 1-based, unique within the identity.
  pub ordinal:       u32,
  pub expected_size: u64,
  pub blob_key:      Option<BlobKey>,
}

impl UploadPart {
  pub fn completed(&self) -> bool { self.blob_key.is_some() }
}

/// Input for allocating a part; ids are assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPart {
  pub ordinal:       u32,
  pub expected_size: u64,
}

// ─── Lock state ──────────────────────────────────────────────────────────────

/// The upload state machine position of an identity, derived from its lock
/// token and parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
  Unlocked,
  LockedIdle,
  AwaitingParts,
  PartsComplete,
}

impl LockState {
  pub fn of(identity: &DocumentIdentity, parts: &[UploadPart]) -> Self {
    match (identity.is_locked(), parts.is_empty()) {
      (false, _) => Self::Unlocked,
      (true, true) => Self::LockedIdle,
      (true, false) if parts.iter().all(UploadPart::completed) => {
        Self::PartsComplete
      }
      (true, false) => Self::AwaitingParts,
    }
  }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// A revision together with its identity and, for the current revision, the
/// open upload parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub identity: DocumentIdentity,
  pub revision: DocumentRevision,
  pub parts:    Vec<UploadPart>,
}

impl Document {
  pub fn state(&self) -> LockState { LockState::of(&self.identity, &self.parts) }
}

/// Input to [`crate::store::Repository::insert_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub metadata:      DocumentMetadata,
  pub size:          Option<u64>,
  pub content_key:   Option<BlobKey>,
  pub parts:         Vec<NewPart>,
  /// Set when the document is created locked for a chunked upload.
  pub lock_token:    Option<LockToken>,
  pub registered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn metadata() -> DocumentMetadata {
    DocumentMetadata {
      source_organization:    "159351741".into(),
      business_id:            String::new(),
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
    }
  }

  #[test]
  fn confidentiality_ranks_follow_declaration_order() {
    assert!(Confidentiality::Public < Confidentiality::TopSecret);
    assert_eq!(Confidentiality::Public.rank(), 0);
    assert_eq!(Confidentiality::TopSecret.rank(), 7);
    assert_eq!(Confidentiality::Confidential.rank(), 4);
  }

  #[test]
  fn enum_wire_names() {
    assert_eq!(Confidentiality::TopSecret.as_ref(), "TOP_SECRET");
    assert_eq!(
      "RESTRICTED_PUBLIC".parse::<Confidentiality>().unwrap(),
      Confidentiality::RestrictedPublic
    );
    assert_eq!(Status::ForApproval.as_ref(), "FOR_APPROVAL");
    assert_eq!(IntegrityAlgorithm::Sha256.as_ref(), "SHA_256");
    assert!("secret-ish".parse::<Confidentiality>().is_err());
    assert_eq!(
      serde_json::to_string(&IntegrityAlgorithm::Crc16).unwrap(),
      "\"CRC_16\""
    );
  }

  #[test]
  fn valid_metadata_passes() {
    assert!(metadata().validate().is_ok());
  }

  #[test]
  fn received_on_rejects_draft_status() {
    let mut meta = metadata();
    meta.received_on = NaiveDate::from_ymd_opt(2019, 1, 1);
    meta.status = Some(Status::Draft);
    let errors = meta.validate().unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.iter().next().unwrap().code, ValidationCode::InvalidForReceived);

    meta.status = Some(Status::Final);
    assert!(meta.validate().is_ok());
  }

  #[test]
  fn collects_every_violation() {
    let mut meta = metadata();
    meta.title = String::new();
    meta.language = "english".into();
    meta.source_organization = "123456789".into();
    let errors = meta.validate().unwrap_err();
    let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["sourceOrganization", "title", "language"]);
  }

  #[test]
  fn patch_cannot_change_document_type() {
    let mut meta = metadata();
    let patch = DocumentPatch {
      document_type: Some("https://ext/dt/2".into()),
      ..Default::default()
    };
    let errors = patch.apply(&mut meta).unwrap_err();
    assert_eq!(errors.iter().next().unwrap().code, ValidationCode::Immutable);
    assert_eq!(meta.document_type, "https://ext/dt/1");
  }

  #[test]
  fn patch_applies_and_clears() {
    let mut meta = metadata();
    meta.status = Some(Status::Draft);
    let patch = DocumentPatch {
      title: Some("s2".into()),
      status: Some(None),
      document_type: Some("https://ext/dt/1".into()),
      ..Default::default()
    };
    patch.apply(&mut meta).unwrap();
    assert_eq!(meta.title, "s2");
    assert_eq!(meta.status, None);
  }

  #[test]
  fn lock_state_derivation() {
    let unlocked = DocumentIdentity {
      id:         Uuid::new_v4(),
      lock_token: None,
      created_at: Utc::now(),
    };
    let locked = DocumentIdentity {
      lock_token: Some(LockToken::new("t")),
      ..unlocked.clone()
    };
    let part = |key: Option<&str>| UploadPart {
      id:            Uuid::new_v4(),
      identity_id:   locked.id,
      ordinal:       1,
      expected_size: 10,
      blob_key:      key.map(BlobKey::new),
    };

    assert_eq!(LockState::of(&unlocked, &[]), LockState::Unlocked);
    assert_eq!(LockState::of(&locked, &[]), LockState::LockedIdle);
    assert_eq!(
      LockState::of(&locked, &[part(Some("a")), part(None)]),
      LockState::AwaitingParts
    );
    assert_eq!(
      LockState::of(&locked, &[part(Some("a")), part(Some("b"))]),
      LockState::PartsComplete
    );
  }
}
