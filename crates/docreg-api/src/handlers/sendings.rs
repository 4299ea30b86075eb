//! Handlers for `/sendings` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/sendings` | Optional `?identity=…&role=SENDER\|RECIPIENT` |
//! | `POST`   | `/sendings` | Exactly one of the three address objects |
//! | `GET`    | `/sendings/{id}` | |
//! | `PUT`    | `/sendings/{id}` | |
//! | `PATCH`  | `/sendings/{id}` | An address object, if given, replaces the address |
//! | `DELETE` | `/sendings/{id}` | |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use docreg_core::relation::{
  Address, DomesticAddress, ForeignAddress, PostalAddress, PostalBoxKind, Sending, SendingRole,
};
use docreg_registry::Backend;
use serde::Deserialize;
use uuid::Uuid;

use super::{created, nullable, urls};
use crate::{
  AppState,
  auth::Authenticated,
  error::{ApiError, Result},
  etag,
  params::{Id, Params, Parser},
  views::SendingView,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalAddressBody {
  pub box_kind:    String,
  pub box_number:  u32,
  pub postal_code: String,
  pub city:        String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendingBody {
  pub identity:         Option<String>,
  pub addressee:        Option<String>,
  pub role:             Option<String>,
  pub note:             Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub received_on:      Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub sent_on:          Option<Option<String>>,
  #[serde(default, deserialize_with = "nullable")]
  pub contact:          Option<Option<String>>,
  pub contact_name:     Option<String>,
  pub domestic_address: Option<DomesticAddress>,
  pub foreign_address:  Option<ForeignAddress>,
  pub postal_address:   Option<PostalAddressBody>,
}

impl SendingBody {
  /// Build the full entity. Without `existing` every required field must be
  /// present; with it, absent fields keep their current value.
  pub fn build(self, id: Uuid, existing: Option<Sending>) -> Result<Sending> {
    let mut p = Parser::new();
    let required = existing.is_none();
    let identity = p
      .field("identity", self.identity, required)
      .and_then(|v| p.identity("identity", &v));
    let addressee = p.field("addressee", self.addressee, required);
    let role = p
      .field("role", self.role, required)
      .and_then(|v| p.choice::<SendingRole>("role", &v));
    let received_on = self
      .received_on
      .map(|d| d.and_then(|d| p.date("receivedOn", &d)));
    let sent_on = self.sent_on.map(|d| d.and_then(|d| p.date("sentOn", &d)));
    let postal = self.postal_address.and_then(|a| {
      let box_kind = p.choice::<PostalBoxKind>("postalAddress.boxKind", &a.box_kind)?;
      Some(PostalAddress {
        box_kind,
        box_number: a.box_number,
        postal_code: a.postal_code,
        city: a.city,
      })
    });

    let any_address =
      self.domestic_address.is_some() || self.foreign_address.is_some() || postal.is_some();
    let address = if any_address || required {
      match Address::from_parts(self.domestic_address, self.foreign_address, postal) {
        Ok(address) => Some(address),
        Err(errors) => {
          p.errors.extend(errors);
          None
        }
      }
    } else {
      None
    };
    p.finish()?;

    match (existing, identity, addressee, role) {
      (Some(current), identity, addressee, role) => Ok(Sending {
        id,
        identity_id: identity.unwrap_or(current.identity_id),
        addressee: addressee.unwrap_or(current.addressee),
        role: role.unwrap_or(current.role),
        note: self.note.unwrap_or(current.note),
        received_on: received_on.unwrap_or(current.received_on),
        sent_on: sent_on.unwrap_or(current.sent_on),
        contact: self.contact.unwrap_or(current.contact),
        contact_name: self.contact_name.unwrap_or(current.contact_name),
        address: address.unwrap_or(current.address),
      }),
      (None, Some(identity_id), Some(addressee), Some(role)) => {
        let address = address.ok_or_else(|| ApiError::Malformed("missing address".into()))?;
        Ok(Sending {
          id,
          identity_id,
          addressee,
          role,
          note: self.note.unwrap_or_default(),
          received_on: received_on.flatten(),
          sent_on: sent_on.flatten(),
          contact: self.contact.flatten(),
          contact_name: self.contact_name.unwrap_or_default(),
          address,
        })
      }
      _ => Err(ApiError::Malformed("incomplete sending".into())),
    }
  }
}

/// `GET /sendings`
pub async fn list<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  headers: HeaderMap,
  params: Params,
) -> Result<Response> {
  params.allow(&["identity", "role"])?;
  let mut p = Parser::new();
  let identity = params.get("identity").and_then(|v| p.identity("identity", v));
  let role = params.get("role").and_then(|v| p.choice::<SendingRole>("role", v));
  p.finish()?;

  let urls = urls(&state);
  let views: Vec<SendingView> = state
    .registry
    .relations
    .list_sendings(&caller, identity, role)
    .await?
    .into_iter()
    .map(|s| SendingView::new(urls, s))
    .collect();
  Ok(etag::respond(&headers, &views))
}

/// `POST /sendings`
pub async fn create<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  body: std::result::Result<Json<SendingBody>, JsonRejection>,
) -> Result<Response> {
  let Json(body) = body?;
  let sending = body.build(Uuid::new_v4(), None)?;
  let sending = state.registry.relations.create_sending(&caller, sending).await?;
  let view = SendingView::new(urls(&state), sending);
  Ok(created(&view.url.clone(), view))
}

/// `GET /sendings/{id}`
pub async fn get_one<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
) -> Result<Response> {
  let sending = state.registry.relations.get_sending(&caller, id).await?;
  Ok(etag::respond(&headers, &SendingView::new(urls(&state), sending)))
}

/// `PUT /sendings/{id}`
pub async fn replace<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<SendingBody>, JsonRejection>,
) -> Result<Json<SendingView>> {
  let Json(body) = body?;
  let sending = body.build(id, None)?;
  let sending = state.registry.relations.update_sending(&caller, sending).await?;
  Ok(Json(SendingView::new(urls(&state), sending)))
}

/// `PATCH /sendings/{id}`
pub async fn patch<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<SendingBody>, JsonRejection>,
) -> Result<Json<SendingView>> {
  let Json(body) = body?;
  let relations = &state.registry.relations;
  let existing = relations.get_sending(&caller, id).await?;
  let sending = body.build(id, Some(existing))?;
  let sending = relations.update_sending(&caller, sending).await?;
  Ok(Json(SendingView::new(urls(&state), sending)))
}

/// `DELETE /sendings/{id}`
pub async fn destroy<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
) -> Result<StatusCode> {
  state.registry.relations.delete_sending(&caller, id).await?;
  Ok(StatusCode::NO_CONTENT)
}
