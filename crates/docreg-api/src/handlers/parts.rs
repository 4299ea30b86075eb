//! Handlers for `/parts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/parts/{id}` | |
//! | `PUT` | `/parts/{id}` | `multipart/form-data` with `content` (file) and `lockToken` |

use axum::{
  Json,
  extract::{
    Multipart, State,
    multipart::{MultipartError, MultipartRejection},
  },
  http::{HeaderMap, StatusCode},
  response::Response,
};
use bytes::Bytes;
use docreg_core::{document::LockToken, validation::ValidationCode};
use docreg_registry::Backend;

use super::urls;
use crate::{
  AppState,
  auth::Authenticated,
  error::{ApiError, Result},
  etag,
  params::{Id, Parser},
  views::PartView,
};

impl From<MultipartRejection> for ApiError {
  fn from(e: MultipartRejection) -> Self {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      Self::PayloadTooLarge
    } else {
      Self::Malformed(e.body_text())
    }
  }
}

impl From<MultipartError> for ApiError {
  fn from(e: MultipartError) -> Self {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      Self::PayloadTooLarge
    } else {
      Self::Malformed(e.body_text())
    }
  }
}

/// `GET /parts/{id}`
pub async fn get_one<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  headers: HeaderMap,
) -> Result<Response> {
  let part = state.registry.documents.get_part(&caller, id).await?;
  Ok(etag::respond(&headers, &PartView::new(urls(&state), &part)))
}

/// `PUT /parts/{id}`
pub async fn upload<K: Backend>(
  State(state): State<AppState<K>>,
  Authenticated(caller): Authenticated,
  Id(id): Id,
  multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PartView>> {
  let mut multipart = multipart?;
  let mut content: Option<Bytes> = None;
  let mut token: Option<String> = None;
  while let Some(field) = multipart.next_field().await? {
    let name = field.name().unwrap_or_default().to_owned();
    match name.as_str() {
      "content" => content = Some(field.bytes().await?),
      "lockToken" => token = Some(field.text().await?),
      _ => {}
    }
  }

  let mut p = Parser::new();
  let content = p.require("content", content);
  let token = p.require("lockToken", token);
  if let Some(t) = &token
    && t.trim().is_empty()
  {
    p.errors.push("lockToken", ValidationCode::Blank, "this field may not be blank");
  }
  p.finish()?;
  let (Some(content), Some(token)) = (content, token) else {
    return Err(ApiError::Malformed("incomplete part upload".into()));
  };

  let part = state
    .registry
    .documents
    .upload_part(&caller, id, LockToken::new(token), content)
    .await?;
  Ok(Json(PartView::new(urls(&state), &part)))
}
