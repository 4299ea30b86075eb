//! Handlers for `/usageRights` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/usageRights` | Optional `?identity=<document url>` |
//! | `POST`   | `/usageRights` | |
//! | `GET`    | `/usageRights/{id}` | |
//! | `PUT`    | `/usageRights/{id}` | |
//! | `PATCH`  | `/usageRights/{id}` | |
//! | `DELETE` | `/usageRights/{id}` | |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use docreg_core::relation::UsageRight;
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
  views::UsageRightView,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRightBody {
  pub identity:    Option<String>,
  pub description: Option<String>,
  pub start_at:    Option<String>,
  #[serde(default, deserialize_with = "nullable")]
  pub end_at:      Option<Option<String>>,
}

impl UsageRightBody {
  /// Build the full entity. Without `existing` every field is required;
  /// with it, absent fields keep their current value.
  pub fn build(self, id: Uuid, existing: Option<UsageRight>) -> Result<UsageRight> {
    let mut p = Parser::new();
    let required = existing.is_none();
    let identity = p
      .field("identity", self.identity, required)
      .and_then(|v| p.identity("identity", &v));
    let description = p.field("description", self.description, required);
    let start_at = p
      .field("startAt", self.start_at, required)
      .and_then(|v| p.datetime("startAt", &v));
    let end_at = self
      .end_at
      .map(|v| v.and_then(|v| p.datetime("endAt", &v)));
    p.finish()?;

    match (existing, identity, description, start_at) {
      (Some(current), identity, description, start_at) => Ok(UsageRight {
        id,
        identity_id: identity.unwrap_or(current.identity_id),
        description: description.unwrap_or(current.description),
        start_at:    start_at.unwrap_or(current.start_at),
        end_at:      end_at.unwrap_or(current.end_at),
      }),
      (None, Some(identity_id), Some(description), Some(start_at)) => Ok(UsageRight {
        id,
        identity_id,
        description,
        start_at,
        end_at: end_at.flatten(),
      }),
      _ => Err(ApiError::Malformed("incomplete usage right".into())),
    }
  }
}

/// `GET /usageRights`
pub async fn list<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  headers: HeaderMap,
  params: Params,
) -> Result<Response> {
  params.allow(&["identity"])?;
  let mut p = Parser::new();
  let identity = params.get("identity").and_then(|v| p.identity("identity", v));
  p.finish()?;

  let urls = urls(&state);
  let views: Vec<UsageRightView> = state
    .registry
    .relations
    .list_usage_rights(&caller, identity)
    .await?
    .into_iter()
    .map(|r| UsageRightView::new(urls, r))
    .collect();
  Ok(etag::respond(&headers, &views))
}

/// `POST /usageRights`
pub async fn create<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  body: std::result::Result<Json<UsageRightBody>, JsonRejection>,
) -> Result<Response> {
  let Json(body) = body?;
  let right = body.build(Uuid::new_v4(), None)?;
  let right = state.registry.relations.create_usage_right(&caller, right).await?;
  let view = UsageRightView::new(urls(&state), right);
  Ok(created(&view.url.clone(), view))
}

/// `GET /usageRights/{id}`
pub async fn get_one<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
) -> Result<Response> {
  let right = state.registry.relations.get_usage_right(&caller, id).await?;
  Ok(etag::respond(&headers, &UsageRightView::new(urls(&state), right)))
}

/// `PUT /usageRights/{id}`
pub async fn replace<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<UsageRightBody>, JsonRejection>,
) -> Result<Json<UsageRightView>> {
  let Json(body) = body?;
  let right = body.build(id, None)?;
  let right = state.registry.relations.update_usage_right(&caller, right).await?;
  Ok(Json(UsageRightView::new(urls(&state), right)))
}

/// `PATCH /usageRights/{id}`
pub async fn patch<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  body: std::result::Result<Json<UsageRightBody>, JsonRejection>,
) -> Result<Json<UsageRightView>> {
  let Json(body) = body?;
  let relations = &state.registry.relations;
  let existing = relations.get_usage_right(&caller, id).await?;
  let right = body.build(id, Some(existing))?;
  let right = relations.update_usage_right(&caller, right).await?;
  Ok(Json(UsageRightView::new(urls(&state), right)))
}

/// `DELETE /usageRights/{id}`
pub async fn destroy<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
) -> Result<StatusCode> {
  state.registry.relations.delete_usage_right(&caller, id).await?;
  Ok(StatusCode::NO_CONTENT)
}
