//! Handlers for `/objectLinks` endpoints. Links are immutable: there is no
//! update.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/objectLinks` | Optional `?identity=…&object=…` |
//! | `POST`   | `/objectLinks` | The object URL must resolve |
//! | `GET`    | `/objectLinks/{id}` | |
//! | `DELETE` | `/objectLinks/{id}` | |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use docreg_core::relation::{ObjectKind, ObjectLink};
use docreg_registry::Backend;
use serde::Deserialize;
use uuid::Uuid;

use super::{created, urls};
use crate::{
  AppState,
  auth::Authenticated,
  error::{ApiError, Result},
  etag,
  params::{Id, Params, Parser},
  views::ObjectLinkView,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLinkBody {
  pub identity:            Option<String>,
  #[serde(alias = "object")]
  pub external_object_url: Option<String>,
  pub object_kind:         Option<String>,
}

impl ObjectLinkBody {
  pub fn build(self, id: Uuid) -> Result<ObjectLink> {
    let mut p = Parser::new();
    let identity = p
      .require("identity", self.identity)
      .and_then(|v| p.identity("identity", &v));
    let object = p.require("externalObjectUrl", self.external_object_url);
    let kind = p
      .require("objectKind", self.object_kind)
      .and_then(|v| p.choice::<ObjectKind>("objectKind", &v));
    p.finish()?;
    match (identity, object, kind) {
      (Some(identity_id), Some(external_object_url), Some(object_kind)) => Ok(ObjectLink {
        id,
        identity_id,
        external_object_url,
        object_kind,
      }),
      _ => Err(ApiError::Malformed("incomplete object link".into())),
    }
  }
}

/// `GET /objectLinks`
pub async fn list<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  headers: HeaderMap,
  params: Params,
) -> Result<Response> {
  params.allow(&["identity", "object"])?;
  let mut p = Parser::new();
  let identity = params.get("identity").and_then(|v| p.identity("identity", v));
  p.finish()?;

  let urls = urls(&state);
  let views: Vec<ObjectLinkView> = state
    .registry
    .relations
    .list_object_links(&caller, identity, params.string("object"))
    .await?
    .into_iter()
    .map(|l| ObjectLinkView::new(urls, l))
    .collect();
  Ok(etag::respond(&headers, &views))
}

/// `POST /objectLinks`
pub async fn create<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  body: std::result::Result<Json<ObjectLinkBody>, JsonRejection>,
) -> Result<Response> {
  let Json(body) = body?;
  let link = body.build(Uuid::new_v4())?;
  let link = state.registry.relations.create_object_link(&caller, link).await?;
  let view = ObjectLinkView::new(urls(&state), link);
  Ok(created(&view.url.clone(), view))
}

/// `GET /objectLinks/{id}`
pub async fn get_one<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
) -> Result<Response> {
  let link = state.registry.relations.get_object_link(&caller, id).await?;
  Ok(etag::respond(&headers, &ObjectLinkView::new(urls(&state), link)))
}

/// `DELETE /objectLinks/{id}`
pub async fn destroy<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
) -> Result<StatusCode> {
  state.registry.relations.delete_object_link(&caller, id).await?;
  Ok(StatusCode::NO_CONTENT)
}
