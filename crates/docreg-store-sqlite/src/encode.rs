//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond
//! precision and a `Z` suffix, so lexical order equals chronological order.
//! Dates are `YYYY-MM-DD`. Revision metadata and sending addresses are stored
//! as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use docreg_core::{
  blob::BlobKey,
  document::{
    Confidentiality, DocumentIdentity, DocumentMetadata, DocumentRevision, LockToken,
    UploadPart,
  },
  relation::{Address, ObjectLink, Sending, UsageRight},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

/// Parse a strum-backed enum from its wire name.
pub fn decode_enum<T: FromStr>(s: &str, what: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode(format!("unknown {what}: {s:?}")))
}

pub fn encode_confidentiality(c: Confidentiality) -> i64 { i64::from(c.rank()) }

/// Sizes and ordinals are `u64`/`u32` in the domain and `INTEGER` (i64) in
/// SQLite.
pub fn decode_u64(v: i64, what: &str) -> Result<u64> {
  u64::try_from(v).map_err(|_| Error::Decode(format!("negative {what}: {v}")))
}

pub fn decode_u32(v: i64, what: &str) -> Result<u32> {
  u32::try_from(v).map_err(|_| Error::Decode(format!("{what} out of range: {v}")))
}

pub fn encode_u64(v: u64) -> Result<i64> {
  i64::try_from(v).map_err(|_| Error::Decode(format!("value too large: {v}")))
}

// ─── Structured columns ──────────────────────────────────────────────────────

pub fn encode_metadata(m: &DocumentMetadata) -> Result<String> {
  Ok(serde_json::to_string(m)?)
}

pub fn encode_address(a: &Address) -> Result<String> { Ok(serde_json::to_string(a)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const IDENTITY_COLUMNS: &str = "i.identity_id, i.lock_token, i.created_at";

/// Raw strings read directly from an `identities` row.
pub struct RawIdentity {
  pub identity_id: String,
  pub lock_token:  Option<String>,
  pub created_at:  String,
}

impl RawIdentity {
  /// Read the three [`IDENTITY_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      identity_id: row.get(at)?,
      lock_token:  row.get(at + 1)?,
      created_at:  row.get(at + 2)?,
    })
  }

  pub fn into_identity(self) -> Result<DocumentIdentity> {
    Ok(DocumentIdentity {
      id:         decode_uuid(&self.identity_id)?,
      lock_token: self.lock_token.map(LockToken::new),
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const REVISION_COLUMNS: &str = "r.revision_id, r.identity_id, r.version, \
                                    r.registered_at, r.metadata_json, r.size, \
                                    r.content_key";

/// Raw values read directly from a `revisions` row.
pub struct RawRevision {
  pub revision_id:   String,
  pub identity_id:   String,
  pub version:       i64,
  pub registered_at: String,
  pub metadata_json: String,
  pub size:          Option<i64>,
  pub content_key:   Option<String>,
}

impl RawRevision {
  /// Read the seven [`REVISION_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      revision_id:   row.get(at)?,
      identity_id:   row.get(at + 1)?,
      version:       row.get(at + 2)?,
      registered_at: row.get(at + 3)?,
      metadata_json: row.get(at + 4)?,
      size:          row.get(at + 5)?,
      content_key:   row.get(at + 6)?,
    })
  }

  pub fn into_revision(self) -> Result<DocumentRevision> {
    Ok(DocumentRevision {
      identity_id:   decode_uuid(&self.identity_id)?,
      revision_id:   decode_uuid(&self.revision_id)?,
      version:       decode_u32(self.version, "version")?,
      registered_at: decode_dt(&self.registered_at)?,
      metadata:      serde_json::from_str(&self.metadata_json)?,
      size:          self.size.map(|s| decode_u64(s, "size")).transpose()?,
      content_key:   self.content_key.map(BlobKey::new),
    })
  }
}

pub const PART_COLUMNS: &str = "p.part_id, p.identity_id, p.ordinal, p.expected_size, p.blob_key";

/// Raw values read directly from a `parts` row.
pub struct RawPart {
  pub part_id:       String,
  pub identity_id:   String,
  pub ordinal:       i64,
  pub expected_size: i64,
  pub blob_key:      Option<String>,
}

impl RawPart {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      part_id:       row.get(0)?,
      identity_id:   row.get(1)?,
      ordinal:       row.get(2)?,
      expected_size: row.get(3)?,
      blob_key:      row.get(4)?,
    })
  }

  pub fn into_part(self) -> Result<UploadPart> {
    Ok(UploadPart {
      id:            decode_uuid(&self.part_id)?,
      identity_id:   decode_uuid(&self.identity_id)?,
      ordinal:       decode_u32(self.ordinal, "ordinal")?,
      expected_size: decode_u64(self.expected_size, "expected size")?,
      blob_key:      self.blob_key.map(BlobKey::new),
    })
  }
}

pub const USAGE_RIGHT_COLUMNS: &str =
  "u.usage_right_id, u.identity_id, u.description, u.start_at, u.end_at";

pub struct RawUsageRight {
  pub usage_right_id: String,
  pub identity_id:    String,
  pub description:    String,
  pub start_at:       String,
  pub end_at:         Option<String>,
}

impl RawUsageRight {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      usage_right_id: row.get(0)?,
      identity_id:    row.get(1)?,
      description:    row.get(2)?,
      start_at:       row.get(3)?,
      end_at:         row.get(4)?,
    })
  }

  pub fn into_usage_right(self) -> Result<UsageRight> {
    Ok(UsageRight {
      id:          decode_uuid(&self.usage_right_id)?,
      identity_id: decode_uuid(&self.identity_id)?,
      description: self.description,
      start_at:    decode_dt(&self.start_at)?,
      end_at:      self.end_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub const OBJECT_LINK_COLUMNS: &str =
  "o.object_link_id, o.identity_id, o.object_url, o.object_kind";

pub struct RawObjectLink {
  pub object_link_id: String,
  pub identity_id:    String,
  pub object_url:     String,
  pub object_kind:    String,
}

impl RawObjectLink {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      object_link_id: row.get(0)?,
      identity_id:    row.get(1)?,
      object_url:     row.get(2)?,
      object_kind:    row.get(3)?,
    })
  }

  pub fn into_object_link(self) -> Result<ObjectLink> {
    Ok(ObjectLink {
      id:                  decode_uuid(&self.object_link_id)?,
      identity_id:         decode_uuid(&self.identity_id)?,
      external_object_url: self.object_url,
      object_kind:         decode_enum(&self.object_kind, "object kind")?,
    })
  }
}

pub const SENDING_COLUMNS: &str = "s.sending_id, s.identity_id, s.addressee, s.role, \
                                   s.note, s.received_on, s.sent_on, s.contact, \
                                   s.contact_name, s.address_json";

pub struct RawSending {
  pub sending_id:   String,
  pub identity_id:  String,
  pub addressee:    String,
  pub role:         String,
  pub note:         String,
  pub received_on:  Option<String>,
  pub sent_on:      Option<String>,
  pub contact:      Option<String>,
  pub contact_name: String,
  pub address_json: String,
}

impl RawSending {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sending_id:   row.get(0)?,
      identity_id:  row.get(1)?,
      addressee:    row.get(2)?,
      role:         row.get(3)?,
      note:         row.get(4)?,
      received_on:  row.get(5)?,
      sent_on:      row.get(6)?,
      contact:      row.get(7)?,
      contact_name: row.get(8)?,
      address_json: row.get(9)?,
    })
  }

  pub fn into_sending(self) -> Result<Sending> {
    Ok(Sending {
      id:           decode_uuid(&self.sending_id)?,
      identity_id:  decode_uuid(&self.identity_id)?,
      addressee:    self.addressee,
      role:         decode_enum(&self.role, "sending role")?,
      note:         self.note,
      received_on:  self.received_on.as_deref().map(decode_date).transpose()?,
      sent_on:      self.sent_on.as_deref().map(decode_date).transpose()?,
      contact:      self.contact,
      contact_name: self.contact_name,
      address:      serde_json::from_str(&self.address_json)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    let c = a + chrono::Duration::days(400);
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
    assert!(ea.ends_with('Z'));
  }

  #[test]
  fn dates_round_trip() {
    let d = NaiveDate::from_ymd_opt(2018, 6, 27).unwrap();
    assert_eq!(encode_date(d), "2018-06-27");
    assert_eq!(decode_date("2018-06-27").unwrap(), d);
    assert!(decode_date("27-06-2018").is_err());
  }

  #[test]
  fn negative_sizes_are_rejected() {
    assert!(decode_u64(-1, "size").is_err());
    assert_eq!(decode_u64(17, "size").unwrap(), 17);
  }
}
