//! Entities that point at a document: usage rights, object links, and
//! sendings. Each is owned by exactly one [`DocumentIdentity`](crate::document::DocumentIdentity)
//! and is removed with it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::validation::{ValidationCode, ValidationErrors, is_valid_url};

// ─── Usage rights ────────────────────────────────────────────────────────────

/// Conditions under which a document may be used. The first usage right of a
/// document flips its `usageRightsIndicator` to `TRUE`; removing the last one
/// resets it to `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRight {
  pub id:          Uuid,
  pub identity_id: Uuid,
  pub description: String,
  pub start_at:    DateTime<Utc>,
  pub end_at:      Option<DateTime<Utc>>,
}

impl UsageRight {
  pub fn validate(&self) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if errors.not_blank("description", &self.description) {
      errors.max_length("description", &self.description, 1000);
    }
    if let Some(end_at) = self.end_at
      && end_at < self.start_at
    {
      errors.push("endAt", ValidationCode::DateOrder, "endAt must not precede startAt");
    }
    errors.into_result()
  }
}

// ─── Object links ────────────────────────────────────────────────────────────

/// The kind of external object a document is linked to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectKind {
  Case,
  Decision,
  Request,
}

/// How the document relates to the linked object; derived from [`ObjectKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
  BelongsTo,
  Records,
}

impl ObjectKind {
  pub fn relation_kind(self) -> RelationKind {
    match self {
      Self::Case | Self::Request => RelationKind::BelongsTo,
      Self::Decision => RelationKind::Records,
    }
  }
}

/// A link from a document to an external object. `(identity_id,
/// external_object_url)` is unique; the URL and kind never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLink {
  pub id:                  Uuid,
  pub identity_id:         Uuid,
  pub external_object_url: String,
  pub object_kind:         ObjectKind,
}

impl ObjectLink {
  pub fn relation_kind(&self) -> RelationKind { self.object_kind.relation_kind() }

  pub fn validate(&self) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if errors.not_blank("object", &self.external_object_url)
      && errors.max_length("object", &self.external_object_url, 1000)
      && !is_valid_url(&self.external_object_url)
    {
      errors.push("object", ValidationCode::Invalid, "must be an absolute URL");
    }
    errors.into_result()
  }
}

// ─── Sendings ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SendingRole {
  Sender,
  Recipient,
}

/// A street address inside the country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomesticAddress {
  pub street_name:         String,
  pub house_number:        u32,
  #[serde(default)]
  pub house_letter:        String,
  #[serde(default)]
  pub house_number_suffix: String,
  #[serde(default)]
  pub postal_code:         String,
  pub city:                String,
}

/// Free-form address lines plus the country, identified by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignAddress {
  pub line1:   String,
  #[serde(default)]
  pub line2:   String,
  #[serde(default)]
  pub line3:   String,
  pub country: String,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PostalBoxKind {
  PostBox,
  ReplyNumber,
}

/// A post box or reply-number address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddress {
  pub box_kind:    PostalBoxKind,
  pub box_number:  u32,
  pub postal_code: String,
  pub city:        String,
}

/// Exactly one address per sending; the sum type makes the rule structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
  Domestic(DomesticAddress),
  Foreign(ForeignAddress),
  Postal(PostalAddress),
}

impl Address {
  /// The wire field name carrying this variant.
  pub fn field_name(&self) -> &'static str {
    match self {
      Self::Domestic(_) => "domesticAddress",
      Self::Foreign(_) => "foreignAddress",
      Self::Postal(_) => "postalAddress",
    }
  }

  /// Build from the three optional wire objects, rejecting anything other
  /// than exactly one.
  pub fn from_parts(
    domestic: Option<DomesticAddress>,
    foreign: Option<ForeignAddress>,
    postal: Option<PostalAddress>,
  ) -> Result<Self, ValidationErrors> {
    match (domestic, foreign, postal) {
      (Some(a), None, None) => Ok(Self::Domestic(a)),
      (None, Some(a), None) => Ok(Self::Foreign(a)),
      (None, None, Some(a)) => Ok(Self::Postal(a)),
      (d, f, p) => {
        let given = [d.is_some(), f.is_some(), p.is_some()]
          .into_iter()
          .filter(|x| *x)
          .count();
        Err(ValidationErrors::single(
          "address",
          ValidationCode::InvalidAddress,
          format!(
            "exactly one of domesticAddress, foreignAddress or postalAddress \
             is required ({given} given)"
          ),
        ))
      }
    }
  }

  fn validate(&self, errors: &mut ValidationErrors) {
    let prefix = self.field_name();
    let field = |name: &str| format!("{prefix}.{name}");
    match self {
      Self::Domestic(a) => {
        if errors.not_blank(&field("streetName"), &a.street_name) {
          errors.max_length(&field("streetName"), &a.street_name, 24);
        }
        if !(1..=99999).contains(&a.house_number) {
          errors.push(
            field("houseNumber"),
            ValidationCode::Invalid,
            "must be between 1 and 99999",
          );
        }
        errors.max_length(&field("houseLetter"), &a.house_letter, 1);
        errors.max_length(&field("houseNumberSuffix"), &a.house_number_suffix, 4);
        errors.max_length(&field("postalCode"), &a.postal_code, 7);
        if errors.not_blank(&field("city"), &a.city) {
          errors.max_length(&field("city"), &a.city, 80);
        }
      }
      Self::Foreign(a) => {
        if errors.not_blank(&field("line1"), &a.line1) {
          errors.max_length(&field("line1"), &a.line1, 35);
        }
        errors.max_length(&field("line2"), &a.line2, 35);
        errors.max_length(&field("line3"), &a.line3, 35);
        if errors.not_blank(&field("country"), &a.country) && !is_valid_url(&a.country) {
          errors.push(field("country"), ValidationCode::Invalid, "must be an absolute URL");
        }
      }
      Self::Postal(a) => {
        if a.box_number == 0 {
          errors.push(field("boxNumber"), ValidationCode::Invalid, "must be positive");
        }
        if errors.not_blank(&field("postalCode"), &a.postal_code) {
          errors.max_length(&field("postalCode"), &a.postal_code, 7);
        }
        if errors.not_blank(&field("city"), &a.city) {
          errors.max_length(&field("city"), &a.city, 80);
        }
      }
    }
  }
}

/// A record of the document being sent to, or received from, an addressee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sending {
  pub id:           Uuid,
  pub identity_id:  Uuid,
  pub addressee:    String,
  pub role:         SendingRole,
  pub note:         String,
  pub received_on:  Option<NaiveDate>,
  pub sent_on:      Option<NaiveDate>,
  pub contact:      Option<String>,
  pub contact_name: String,
  pub address:      Address,
}

impl Sending {
  pub fn validate(&self) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if errors.not_blank("addressee", &self.addressee) && !is_valid_url(&self.addressee) {
      errors.push("addressee", ValidationCode::Invalid, "must be an absolute URL");
    }
    errors.max_length("note", &self.note, 200);
    if let Some(contact) = &self.contact
      && !is_valid_url(contact)
    {
      errors.push("contact", ValidationCode::Invalid, "must be an absolute URL");
    }
    errors.max_length("contactName", &self.contact_name, 40);
    self.address.validate(&mut errors);
    errors.into_result()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  fn domestic() -> DomesticAddress {
    DomesticAddress {
      street_name:         "Keizersgracht".into(),
      house_number:        117,
      house_letter:        "A".into(),
      house_number_suffix: String::new(),
      postal_code:         "1015CJ".into(),
      city:                "Amsterdam".into(),
    }
  }

  fn postal() -> PostalAddress {
    PostalAddress {
      box_kind:    PostalBoxKind::PostBox,
      box_number:  12,
      postal_code: "1000AA".into(),
      city:        "Amsterdam".into(),
    }
  }

  #[test]
  fn exactly_one_address() {
    assert!(matches!(
      Address::from_parts(Some(domestic()), None, None),
      Ok(Address::Domestic(_))
    ));
    assert!(matches!(
      Address::from_parts(None, None, Some(postal())),
      Ok(Address::Postal(_))
    ));

    let none = Address::from_parts(None, None, None).unwrap_err();
    assert_eq!(none.iter().next().unwrap().code, ValidationCode::InvalidAddress);

    let two = Address::from_parts(Some(domestic()), None, Some(postal())).unwrap_err();
    assert!(two.iter().next().unwrap().reason.contains("2 given"));
  }

  #[test]
  fn sending_validation_prefixes_address_fields() {
    let mut address = domestic();
    address.city = String::new();
    let sending = Sending {
      id:           Uuid::new_v4(),
      identity_id:  Uuid::new_v4(),
      addressee:    "https://ext/subjects/1".into(),
      role:         SendingRole::Recipient,
      note:         String::new(),
      received_on:  None,
      sent_on:      None,
      contact:      None,
      contact_name: String::new(),
      address:      Address::Domestic(address),
    };
    let errors = sending.validate().unwrap_err();
    let first = errors.iter().next().unwrap();
    assert_eq!(first.name, "domesticAddress.city");
    assert_eq!(first.code, ValidationCode::Blank);
  }

  #[test]
  fn usage_right_dates_must_be_ordered() {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut right = UsageRight {
      id:          Uuid::new_v4(),
      identity_id: Uuid::new_v4(),
      description: "internal use".into(),
      start_at:    start,
      end_at:      Some(start - chrono::Duration::days(1)),
    };
    let errors = right.validate().unwrap_err();
    assert_eq!(errors.iter().next().unwrap().code, ValidationCode::DateOrder);

    right.end_at = None;
    assert!(right.validate().is_ok());
  }

  #[test]
  fn relation_kind_follows_object_kind() {
    assert_eq!(ObjectKind::Case.relation_kind(), RelationKind::BelongsTo);
    assert_eq!(ObjectKind::Decision.relation_kind(), RelationKind::Records);
    assert_eq!(ObjectKind::Request.relation_kind(), RelationKind::BelongsTo);
  }
}
